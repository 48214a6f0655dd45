//! Boat attacks.

use tracing::debug;

use crate::execution::{AttackExecution, Execution, ExecutionBehavior, ExecutionQueue};
use crate::game::attack::Owner;
use crate::game::formulas::boat_attack_amount;
use crate::game::map::TileRef;
use crate::game::pathfinding::{OceanPathFinder, PathFinder, PathStep};
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::{UnitParams, World};

/// A transport ship carrying troops to a foreign shore.
///
/// Troops leave the attacker when the boat launches. On landing they start
/// a land attack from the landing tile; if the tile already belongs to the
/// attacker they return home. A sunk boat loses its troops.
#[derive(Debug)]
pub struct TransportShipExecution {
    attacker: SmallId,
    target: Owner,
    dst: TileRef,
    troops: Option<u64>,
    boat: Option<UnitId>,
    path_finder: OceanPathFinder,
    active: bool,
}

impl TransportShipExecution {
    /// Send `troops` (default [`boat_attack_amount`]) against `target` at `dst`.
    pub fn new(attacker: SmallId, target: Owner, dst: TileRef, troops: Option<u64>) -> Self {
        Self {
            attacker,
            target,
            dst,
            troops,
            boat: None,
            path_finder: OceanPathFinder::default(),
            active: true,
        }
    }

    /// The boat, once launched.
    pub fn boat(&self) -> Option<UnitId> {
        self.boat
    }

    fn refund(&mut self, world: &mut World, boat: UnitId) {
        let troops = world.unit(boat).map(|u| u.troops).unwrap_or(0);
        if let Some(p) = world.player_mut(self.attacker) {
            p.troops += troops;
        }
        world.delete_unit(boat);
        self.active = false;
    }

    fn land(&mut self, world: &mut World, boat: UnitId, queue: &mut ExecutionQueue) {
        if world.owner_id(self.dst) == self.attacker {
            self.refund(world, boat);
            return;
        }
        let troops = world.unit(boat).map(|u| u.troops).unwrap_or(0);
        let defender = world.owner(self.dst);
        world.conquer(self.attacker, self.dst);
        world.delete_unit(boat);
        queue.push(Execution::Attack(AttackExecution::from_landing(
            self.attacker,
            defender,
            troops,
            self.dst,
        )));
        self.active = false;
    }
}

impl ExecutionBehavior for TransportShipExecution {
    fn init(&mut self, world: &mut World) -> Result<(), TickError> {
        let Some(attacker) = world.player(self.attacker) else {
            return Err(TickError::PlayerNotFound(self.attacker));
        };
        let available = attacker.troops;
        let map = world.map();
        let valid_dst = map.is_valid(self.dst) && map.is_land(self.dst) && map.is_shoreline(self.dst);
        let hostile = match self.target {
            Owner::Player(t) => world.player(t).is_some() && !world.is_friendly(self.attacker, t),
            Owner::Unclaimed => true,
        };
        if !valid_dst || !hostile || world.owner(self.dst) != self.target {
            debug!(attacker = self.attacker, dst = self.dst, "invalid boat attack ignored");
            self.active = false;
            return Ok(());
        }
        let Some(src) = world.can_build(self.attacker, UnitType::TransportShip, self.dst) else {
            debug!(attacker = self.attacker, dst = self.dst, "no shore to launch boat from");
            self.active = false;
            return Ok(());
        };

        let troops = self
            .troops
            .unwrap_or_else(|| boat_attack_amount(available))
            .min(available);
        let troops = world
            .player_mut(self.attacker)
            .map(|p| p.remove_troops(troops))
            .unwrap_or(0);
        let params = UnitParams { troops, ..Default::default() };
        self.boat = Some(world.build_unit(UnitType::TransportShip, self.attacker, src, params));
        Ok(())
    }

    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let Some(boat) = self.boat else {
            self.active = false;
            return Ok(());
        };
        let Some(unit) = world.active_unit(boat) else {
            // Sunk with everyone aboard.
            self.active = false;
            return Ok(());
        };
        let at = unit.tile;
        match self.path_finder.next_tile(world.map(), at, self.dst, 0) {
            PathStep::Completed(_) => self.land(world, boat, queue),
            PathStep::NextTile(next) => world.move_unit(boat, next),
            PathStep::Pending => {}
            PathStep::PathNotFound => {
                debug!(attacker = self.attacker, dst = self.dst, "boat found no route");
                self.refund(world, boat);
            }
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
