//! Warships
//!
//! A warship patrols random ocean waypoints around its patrol centre,
//! shoots hostile warships and transports, and captures hostile trade ships
//! by sailing onto them. A move order overrides patrolling until reached.

use tracing::debug;

use crate::core::DeterministicRng;
use crate::execution::shell::ShellBattery;
use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::map::TileRef;
use crate::game::pathfinding::{OceanPathFinder, PathFinder, PathStep};
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::{UnitParams, World};

/// Patrol waypoint search: how often the search radius may grow.
const MAX_PATROL_EXPANSIONS: u32 = 3;

/// Path steps a warship takes per tick while chasing a trade ship.
const CHASE_STEPS: usize = 2;

/// Behavior of one warship.
#[derive(Debug)]
pub struct WarshipExecution {
    owner: SmallId,
    patrol_center: TileRef,
    warship: Option<UnitId>,
    target: Option<UnitId>,
    patrol_tile: Option<TileRef>,
    path_finder: OceanPathFinder,
    battery: ShellBattery,
    rng: DeterministicRng,
    active: bool,
}

impl WarshipExecution {
    /// Warship for `owner`, launched from the port nearest `patrol_center`.
    pub fn new(owner: SmallId, patrol_center: TileRef) -> Self {
        Self {
            owner,
            patrol_center,
            warship: None,
            target: None,
            patrol_tile: None,
            path_finder: OceanPathFinder::default(),
            battery: ShellBattery::new(),
            rng: DeterministicRng::new(0),
            active: true,
        }
    }

    /// The warship unit, once built.
    pub fn warship(&self) -> Option<UnitId> {
        self.warship
    }

    /// Best target in range: warships, then transports, then trade ships,
    /// closest first within each class.
    fn find_target(&self, world: &World, warship: UnitId) -> Option<UnitId> {
        let ship = world.active_unit(warship)?;
        let owner = ship.owner;
        let has_port = !world.units_of(owner, UnitType::Port).is_empty();
        let range = world.config().warship_targetting_range;

        world
            .nearby_units(
                ship.tile,
                range,
                &[UnitType::TransportShip, UnitType::Warship, UnitType::TradeShip],
            )
            .into_iter()
            .filter_map(|(id, dist)| world.unit(id).map(|u| (u, dist)))
            .filter(|(u, _)| {
                u.id != warship
                    && u.owner != owner
                    && !world.is_friendly(owner, u.owner)
                    && !self.battery.already_fired_at(u.id)
            })
            .filter(|(u, _)| {
                if u.unit_type != UnitType::TradeShip {
                    return true;
                }
                let dst_owner = u.dst_port.and_then(|p| world.unit(p)).map(|p| p.owner);
                has_port
                    && matches!(dst_owner, Some(o) if o != owner && !world.is_friendly(owner, o))
            })
            .min_by_key(|(u, dist)| {
                let class = match u.unit_type {
                    UnitType::Warship => 0,
                    UnitType::TransportShip => 1,
                    _ => 2,
                };
                (class, *dist, u.id)
            })
            .map(|(u, _)| u.id)
    }

    /// Random ocean tile away from shore near the patrol centre.
    fn random_patrol_tile(&mut self, world: &World) -> Option<TileRef> {
        let map = world.map();
        let cx = map.x(self.patrol_center) as i64;
        let cy = map.y(self.patrol_center) as i64;
        let mut range = world.config().warship_patrol_range.max(2);

        for _ in 0..=MAX_PATROL_EXPANSIONS {
            let half = (range / 2) as i32;
            for _ in 0..range * 2 {
                let x = cx + self.rng.next_int_range(-half, half) as i64;
                let y = cy + self.rng.next_int_range(-half, half) as i64;
                if x < 0 || y < 0 {
                    continue;
                }
                let Some(tile) = map.tile(x as u32, y as u32) else {
                    continue;
                };
                if map.is_ocean(tile) && !map.is_shoreline(tile) {
                    return Some(tile);
                }
            }
            range = range * 3 / 2;
        }
        None
    }

    fn patrol(&mut self, world: &mut World, warship: UnitId, at: TileRef) {
        if self.patrol_tile.is_none() {
            self.patrol_tile = self.random_patrol_tile(world);
        }
        let Some(waypoint) = self.patrol_tile else {
            return;
        };
        match self.path_finder.next_tile(world.map(), at, waypoint, 1) {
            PathStep::Completed(_) | PathStep::PathNotFound => self.patrol_tile = None,
            PathStep::NextTile(next) => world.move_unit(warship, next),
            PathStep::Pending => {}
        }
    }

    fn chase_trade_ship(&mut self, world: &mut World, warship: UnitId, target: UnitId) {
        let capture_distance = world.config().trade_ship_capture_distance;
        for _ in 0..CHASE_STEPS {
            let (Some(at), Some(prey)) = (
                world.active_unit(warship).map(|u| u.tile),
                world.active_unit(target).map(|u| u.tile),
            ) else {
                self.target = None;
                return;
            };
            match self.path_finder.next_tile(world.map(), at, prey, capture_distance) {
                PathStep::Completed(_) => {
                    world.capture_unit(target, self.owner_of(world, warship));
                    self.target = None;
                    return;
                }
                PathStep::NextTile(next) => world.move_unit(warship, next),
                PathStep::Pending => {}
                // Keep the target; the search is retried next step.
                PathStep::PathNotFound => debug!(target = target.0, "no path to trade ship"),
            }
        }
    }

    fn owner_of(&self, world: &World, unit: UnitId) -> SmallId {
        world.unit(unit).map(|u| u.owner).unwrap_or(self.owner)
    }
}

impl ExecutionBehavior for WarshipExecution {
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let warship = match self.warship {
            Some(id) => id,
            None => {
                let Some(spawn) = world.can_build(self.owner, UnitType::Warship, self.patrol_center) else {
                    debug!(owner = self.owner, tile = self.patrol_center, "cannot build warship");
                    self.active = false;
                    return Ok(());
                };
                let id = world.build_unit(UnitType::Warship, self.owner, spawn, UnitParams::default());
                self.rng = DeterministicRng::for_entity(0x5A1F_0000_0000_0000 | id.0 as u64, world.ticks());
                self.warship = Some(id);
                return Ok(());
            }
        };
        let Some(unit) = world.active_unit(warship) else {
            self.active = false;
            return Ok(());
        };
        let (at, move_target) = (unit.tile, unit.move_target);

        self.target = self.find_target(world, warship);
        let target_is_trade = self
            .target
            .and_then(|t| world.unit(t))
            .map(|u| u.unit_type == UnitType::TradeShip)
            .unwrap_or(false);

        if let Some(dst) = move_target {
            match self.path_finder.next_tile(world.map(), at, dst, 0) {
                PathStep::Completed(_) | PathStep::PathNotFound => {
                    if let Some(u) = world.unit_mut(warship) {
                        u.move_target = None;
                    }
                }
                PathStep::NextTile(next) => world.move_unit(warship, next),
                PathStep::Pending => {}
            }
            // Trade ships are not chased while under orders.
            if target_is_trade {
                self.target = None;
            }
        } else if !target_is_trade {
            self.patrol(world, warship, at);
        }
        world.set_target_unit(warship, self.target);

        let Some(target) = self.target else {
            return Ok(());
        };
        if target_is_trade {
            self.chase_trade_ship(world, warship, target);
        } else {
            let rate = world.config().warship_shell_attack_rate;
            self.battery.fire(world, queue, warship, target, rate);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Order a warship to sail to a tile.
#[derive(Debug)]
pub struct MoveWarshipExecution {
    player: SmallId,
    unit: UnitId,
    tile: TileRef,
    active: bool,
}

impl MoveWarshipExecution {
    /// Move `unit` (owned by `player`) to `tile`.
    pub fn new(player: SmallId, unit: UnitId, tile: TileRef) -> Self {
        Self { player, unit, tile, active: true }
    }
}

impl ExecutionBehavior for MoveWarshipExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        self.active = false;
        if !world.map().is_valid(self.tile) || !world.map().is_ocean(self.tile) {
            return Ok(());
        }
        match world.unit_mut(self.unit) {
            Some(u) if u.active && u.owner == self.player && u.unit_type == UnitType::Warship => {
                u.move_target = Some(self.tile);
            }
            _ => debug!(player = self.player, unit = %self.unit, "invalid warship move order"),
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::{coastal_world, info};
    use crate::game::config::GameConfig;
    use crate::game::map::GameMap;
    use crate::game::player::PlayerType;

    fn harbor() -> (World, UnitId) {
        let mut world = coastal_world();
        for y in 0..10 {
            world.conquer(1, y * 10 + 5);
        }
        let port = world.build_unit(UnitType::Port, 1, 55, UnitParams::default());
        world.player_mut(1).unwrap().gold = 10_000_000;
        (world, port)
    }

    #[test]
    fn test_launch_requires_port() {
        let mut world = coastal_world();
        world.conquer(1, 5);
        world.player_mut(1).unwrap().gold = 10_000_000;
        let mut exec = WarshipExecution::new(1, 57);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(!exec.is_active());
    }

    #[test]
    fn test_target_priority() {
        let (mut world, _) = harbor();
        let mut exec = WarshipExecution::new(1, 57);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        let ship = exec.warship().unwrap();
        let at = world.unit(ship).unwrap().tile;

        let boat = world.build_unit(UnitType::TransportShip, 2, at + 1, UnitParams::default());
        assert_eq!(exec.find_target(&world, ship), Some(boat));
        let enemy = world.build_unit(UnitType::Warship, 2, 99, UnitParams::default());
        assert_eq!(exec.find_target(&world, ship), Some(enemy));
    }

    #[test]
    fn test_trade_ship_needs_own_port_and_hostile_destination() {
        let mut world = coastal_world();
        world.conquer(2, 90);
        let p2 = world.build_unit(UnitType::Port, 2, 90, UnitParams::default());
        let trader = world.build_unit(
            UnitType::TradeShip,
            2,
            58,
            UnitParams { dst_port: Some(p2), ..Default::default() },
        );
        let ship = world.build_unit(UnitType::Warship, 1, 57, UnitParams::default());
        let exec = WarshipExecution::new(1, 57);
        // No port of our own yet.
        assert_eq!(exec.find_target(&world, ship), None);

        world.conquer(1, 5);
        world.build_unit(UnitType::Port, 1, 5, UnitParams::default());
        assert_eq!(exec.find_target(&world, ship), Some(trader));
    }

    #[test]
    fn test_fires_after_cooldown() {
        let (mut world, _) = harbor();
        let mut exec = WarshipExecution::new(1, 57);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        let ship = exec.warship().unwrap();
        let at = world.unit(ship).unwrap().tile;
        world.build_unit(UnitType::Warship, 2, at, UnitParams::default());

        let mut queue = Vec::new();
        for _ in 0..25 {
            world.advance_tick();
            exec.tick(&mut world, &mut queue).unwrap();
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_move_order() {
        let (mut world, _) = harbor();
        let mut exec = WarshipExecution::new(1, 57);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        let ship = exec.warship().unwrap();

        let mut order = MoveWarshipExecution::new(1, ship, 99);
        order.tick(&mut world, &mut Vec::new()).unwrap();
        assert_eq!(world.unit(ship).unwrap().move_target, Some(99));

        for _ in 0..30 {
            exec.tick(&mut world, &mut Vec::new()).unwrap();
            if world.unit(ship).unwrap().move_target.is_none() {
                break;
            }
        }
        assert_eq!(world.unit(ship).unwrap().tile, 99);
        assert_eq!(world.unit(ship).unwrap().move_target, None);
    }

    #[test]
    fn test_idle_on_launch_tick() {
        let (mut world, _) = harbor();
        for _ in 0..30 {
            world.advance_tick();
        }
        world.build_unit(UnitType::Warship, 2, 58, UnitParams::default());
        let mut exec = WarshipExecution::new(1, 57);
        let mut queue = Vec::new();
        exec.tick(&mut world, &mut queue).unwrap();
        let ship = exec.warship().unwrap();
        assert!(queue.is_empty());
        assert_eq!(world.unit(ship).unwrap().target_unit, None);

        exec.tick(&mut world, &mut queue).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unreachable_trade_ship_stays_targeted() {
        // Two ocean bodies split by land.
        let rows: Vec<String> = (0..10).map(|_| format!("~~{}{}", ".".repeat(8), "~".repeat(10))).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let map = GameMap::from_ascii(&rows).unwrap();
        let mut world = World::new(
            map,
            GameConfig::default(),
            vec![info("a", PlayerType::Human), info("b", PlayerType::Human)],
        );
        let ship = world.build_unit(UnitType::Warship, 1, 15, UnitParams::default());
        let trader = world.build_unit(UnitType::TradeShip, 2, 0, UnitParams::default());

        let mut exec = WarshipExecution::new(1, 15);
        exec.warship = Some(ship);
        exec.target = Some(trader);
        exec.chase_trade_ship(&mut world, ship, trader);
        assert_eq!(exec.target, Some(trader));
        assert_eq!(world.unit(ship).unwrap().tile, 15);
        assert_eq!(world.unit(trader).unwrap().owner, 2);
    }

    #[test]
    fn test_patrol_tile_is_open_ocean() {
        let rows: Vec<String> = (0..40).map(|_| format!("{}{}", ".".repeat(5), "~".repeat(35))).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let map = GameMap::from_ascii(&rows).unwrap();
        let world = World::new(map, GameConfig::default(), vec![info("a", PlayerType::Human)]);
        let mut exec = WarshipExecution::new(1, world.map().tile(20, 20).unwrap());
        for _ in 0..20 {
            let tile = exec.random_patrol_tile(&world).unwrap();
            assert!(world.map().is_ocean(tile));
            assert!(!world.map().is_shoreline(tile));
        }
    }
}
