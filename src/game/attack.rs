//! Attacks
//!
//! An attack is a pool of troops committed by one player against another
//! player or against unclaimed land. Its troops only shrink, except when a
//! second order against the same target reinforces it.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::map::TileRef;
use crate::game::player::{SmallId, UNCLAIMED};

/// Stable attack identifier (index into the world's attack array).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttackId(pub u32);

impl fmt::Display for AttackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attack#{}", self.0)
    }
}

/// Owner of a tile or target of an attack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    /// Unclaimed land.
    Unclaimed,
    /// A player, by small id.
    Player(SmallId),
}

impl Owner {
    /// Decode a raw tile owner.
    #[inline]
    pub fn from_small_id(id: SmallId) -> Self {
        if id == UNCLAIMED {
            Owner::Unclaimed
        } else {
            Owner::Player(id)
        }
    }

    /// Encode as a raw tile owner.
    #[inline]
    pub fn small_id(self) -> SmallId {
        match self {
            Owner::Unclaimed => UNCLAIMED,
            Owner::Player(id) => id,
        }
    }

    /// The player, if any.
    #[inline]
    pub fn player(self) -> Option<SmallId> {
        match self {
            Owner::Unclaimed => None,
            Owner::Player(id) => Some(id),
        }
    }
}

/// State of a single attack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackState {
    /// Stable id.
    pub id: AttackId,
    /// Attacking player.
    pub attacker: SmallId,
    /// Defender.
    pub target: Owner,
    /// Troops still committed.
    pub troops: u64,
    /// Landing tile for boat attacks.
    pub source_tile: Option<TileRef>,
    /// Retreat ordered, not yet executed.
    pub retreating: bool,
    /// Retreat executed.
    pub retreated: bool,
    /// False once resolved.
    pub active: bool,
}
