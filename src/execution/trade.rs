//! Trade ships.

use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::formulas::trade_ship_gold;
use crate::game::pathfinding::{OceanPathFinder, PathFinder, PathStep};
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::updates::MessageType;
use crate::game::world::{UnitParams, World};

/// A trade ship sailing from one port to another.
///
/// On arrival both port owners are paid. A captured ship turns around to
/// the captor's nearest port and pays only the captor.
#[derive(Debug)]
pub struct TradeShipExecution {
    owner: SmallId,
    src_port: UnitId,
    dst_port: UnitId,
    ship: Option<UnitId>,
    path_finder: OceanPathFinder,
    tiles_travelled: u32,
    was_captured: bool,
    active: bool,
}

impl TradeShipExecution {
    /// Voyage from `src_port` (owned by `owner`) to `dst_port`.
    pub fn new(owner: SmallId, src_port: UnitId, dst_port: UnitId) -> Self {
        Self {
            owner,
            src_port,
            dst_port,
            ship: None,
            path_finder: OceanPathFinder::default(),
            tiles_travelled: 0,
            was_captured: false,
            active: true,
        }
    }

    fn sink(&mut self, world: &mut World, ship: UnitId) {
        world.delete_unit(ship);
        self.active = false;
    }

    fn complete(&mut self, world: &mut World, ship: UnitId) {
        let gold = trade_ship_gold(self.tiles_travelled);
        if self.was_captured {
            let captor = world.unit(ship).map(|u| u.owner).unwrap_or(self.owner);
            if let Some(p) = world.player_mut(captor) {
                p.gold = p.gold.saturating_add(gold);
            }
            world.display_message(format!("Received {gold} gold from captured ship"), MessageType::Success, Some(captor));
        } else {
            let dst_owner = world.unit(self.dst_port).map(|u| u.owner);
            for owner in [Some(self.owner), dst_owner].into_iter().flatten() {
                if let Some(p) = world.player_mut(owner) {
                    p.gold = p.gold.saturating_add(gold);
                }
            }
            world.display_message(format!("Received {gold} gold from trade"), MessageType::Success, Some(self.owner));
        }
        self.sink(world, ship);
    }
}

impl ExecutionBehavior for TradeShipExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let ship = match self.ship {
            Some(id) => id,
            None => {
                let Some(src) = world.active_unit(self.src_port) else {
                    self.active = false;
                    return Ok(());
                };
                let spawn = src.tile;
                if world.can_build(self.owner, UnitType::TradeShip, spawn).is_none() {
                    self.active = false;
                    return Ok(());
                }
                let params = UnitParams { dst_port: Some(self.dst_port), ..Default::default() };
                let id = world.build_unit(UnitType::TradeShip, self.owner, spawn, params);
                self.ship = Some(id);
                id
            }
        };

        let Some(unit) = world.active_unit(ship) else {
            self.active = false;
            return Ok(());
        };
        let (current_owner, at) = (unit.owner, unit.tile);

        if current_owner != self.owner && !self.was_captured {
            self.was_captured = true;
            let nearest = world
                .units_of(current_owner, UnitType::Port)
                .into_iter()
                .filter_map(|id| world.unit(id))
                .min_by_key(|p| (world.map().manhattan_dist(p.tile, at), p.id))
                .map(|p| p.id);
            match nearest {
                Some(port) => {
                    self.dst_port = port;
                    if let Some(u) = world.unit_mut(ship) {
                        u.dst_port = Some(port);
                    }
                }
                None => {
                    self.sink(world, ship);
                    return Ok(());
                }
            }
        }

        let dst = match world.active_unit(self.dst_port) {
            Some(port) if self.was_captured || world.can_trade(current_owner, port.owner) => port.tile,
            _ => {
                self.sink(world, ship);
                return Ok(());
            }
        };

        match self.path_finder.next_tile(world.map(), at, dst, 0) {
            PathStep::Completed(_) => self.complete(world, ship),
            PathStep::NextTile(next) => {
                world.move_unit(ship, next);
                self.tiles_travelled += 1;
            }
            PathStep::Pending => {}
            PathStep::PathNotFound => self.sink(world, ship),
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
