//! Units
//!
//! Ships, structures and ordnance. Units are stored densely by [`UnitId`];
//! a deleted unit stays in place as an inactive tombstone so ids never move.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::map::TileRef;
use crate::game::player::SmallId;

/// Stable unit identifier (index into the world's unit array).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Unit kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Carries troops across water for a boat attack.
    TransportShip,
    /// Armed patrol ship.
    Warship,
    /// Projectile fired by warships and defense posts.
    Shell,
    /// Coastal structure that launches trade ships.
    Port,
    /// Small nuke.
    AtomBomb,
    /// Large nuke.
    HydrogenBomb,
    /// Merchant ship travelling between ports.
    TradeShip,
    /// Launches nukes.
    MissileSilo,
    /// Fires on ships and hardens nearby territory.
    DefensePost,
    /// Raises max population.
    City,
    /// Placeholder while a structure is being built.
    Construction,
}

impl UnitType {
    /// Structures must be placed on the owner's territory.
    pub fn territory_bound(self) -> bool {
        matches!(
            self,
            UnitType::Port
                | UnitType::MissileSilo
                | UnitType::DefensePost
                | UnitType::City
                | UnitType::Construction
        )
    }

    /// Nukes.
    pub fn is_nuke(self) -> bool {
        matches!(self, UnitType::AtomBomb | UnitType::HydrogenBomb)
    }

    /// Ships that move over the ocean.
    pub fn is_ship(self) -> bool {
        matches!(self, UnitType::TransportShip | UnitType::Warship | UnitType::TradeShip)
    }

    /// Blast radii `(inner, outer)` for nukes.
    pub fn nuke_magnitude(self) -> Option<(u32, u32)> {
        match self {
            UnitType::AtomBomb => Some((12, 30)),
            UnitType::HydrogenBomb => Some((80, 100)),
            _ => None,
        }
    }
}

/// State of a single unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    /// Stable id.
    pub id: UnitId,
    /// Kind.
    pub unit_type: UnitType,
    /// Owning player.
    pub owner: SmallId,
    /// Current tile.
    pub tile: TileRef,
    /// Tile before the last move.
    pub last_tile: TileRef,
    /// Hit points, for unit types that have health.
    pub health: Option<i64>,
    /// Troops carried.
    pub troops: u64,
    /// False once deleted.
    pub active: bool,
    /// Tick the current cooldown started.
    pub cooldown_start: Option<u32>,
    /// Ordered destination (warships).
    pub move_target: Option<TileRef>,
    /// Unit currently engaged (warships).
    pub target_unit: Option<UnitId>,
    /// Destination port (trade ships).
    pub dst_port: Option<UnitId>,
    /// Impact tile (nukes).
    pub detonation_dst: Option<TileRef>,
    /// Structure being built (constructions).
    pub construction_type: Option<UnitType>,
    /// Tick the unit was created.
    pub created_at: u32,
}

impl UnitState {
    /// Can this unit be damaged?
    #[inline]
    pub fn has_health(&self) -> bool {
        self.health.is_some()
    }

    /// Is the unit cooling down?
    #[inline]
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_start.is_some()
    }

    /// Ticks left before a cooldown of `duration` ends (0 when not cooling down).
    pub fn ticks_left_in_cooldown(&self, duration: u32, now: u32) -> u32 {
        match self.cooldown_start {
            Some(start) => duration.saturating_sub(now.saturating_sub(start)),
            None => 0,
        }
    }
}
