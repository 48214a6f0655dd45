//! Construction sites.
//!
//! A structure with a build time first appears as a `Construction` unit.
//! Its gold is paid up front; when the timer runs out the site is replaced
//! by the finished structure's execution, which builds the real unit.

use tracing::debug;

use crate::execution::{
    CityExecution, DefensePostExecution, Execution, ExecutionBehavior, ExecutionQueue,
    MissileSiloExecution, NukeExecution, PortExecution, WarshipExecution,
};
use crate::game::formulas::construction_duration;
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::world::{UnitParams, World};

/// Execution that owns a finished unit of `unit_type`, if the type is buildable.
pub fn unit_execution(owner: SmallId, unit_type: UnitType, tile: TileRef) -> Option<Execution> {
    let exec = match unit_type {
        UnitType::Port => Execution::Port(PortExecution::new(owner, tile)),
        UnitType::City => Execution::City(CityExecution::new(owner, tile)),
        UnitType::DefensePost => Execution::DefensePost(DefensePostExecution::new(owner, tile)),
        UnitType::MissileSilo => Execution::MissileSilo(MissileSiloExecution::new(owner, tile)),
        UnitType::Warship => Execution::Warship(WarshipExecution::new(owner, tile)),
        UnitType::AtomBomb | UnitType::HydrogenBomb => {
            Execution::Nuke(NukeExecution::new(owner, unit_type, tile))
        }
        UnitType::TransportShip
        | UnitType::TradeShip
        | UnitType::Shell
        | UnitType::Construction => return None,
    };
    Some(exec)
}

/// Build timer for one structure.
#[derive(Debug)]
pub struct ConstructionExecution {
    owner: SmallId,
    unit_type: UnitType,
    tile: TileRef,
    construction: Option<UnitId>,
    payer: SmallId,
    cost: u64,
    ticks_left: u32,
    active: bool,
}

impl ConstructionExecution {
    /// Build `unit_type` for `owner` at (or near) `tile`.
    pub fn new(owner: SmallId, unit_type: UnitType, tile: TileRef) -> Self {
        Self {
            owner,
            unit_type,
            tile,
            construction: None,
            payer: owner,
            cost: 0,
            ticks_left: 0,
            active: true,
        }
    }

    fn start(&mut self, world: &mut World, queue: &mut ExecutionQueue) {
        let Some(site) = world.can_build(self.owner, self.unit_type, self.tile) else {
            debug!(owner = self.owner, unit_type = ?self.unit_type, tile = self.tile, "cannot build");
            self.active = false;
            return;
        };
        let Some(duration) = construction_duration(world.config(), self.unit_type) else {
            // Nothing to wait for: ships and nukes launch from their execution.
            queue.extend(unit_execution(self.owner, self.unit_type, self.tile));
            self.active = false;
            return;
        };
        self.cost = world.unit_cost(self.owner, self.unit_type);
        self.payer = self.owner;
        let params = UnitParams { construction_type: Some(self.unit_type), ..Default::default() };
        self.construction = Some(world.build_unit(UnitType::Construction, self.owner, site, params));
        if let Some(p) = world.player_mut(self.owner) {
            p.remove_gold(self.cost);
        }
        self.tile = site;
        self.ticks_left = duration;
    }
}

impl ExecutionBehavior for ConstructionExecution {
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let Some(construction) = self.construction else {
            self.start(world, queue);
            return Ok(());
        };
        let Some(unit) = world.active_unit(construction) else {
            self.active = false;
            return Ok(());
        };
        // Captured sites are finished for the captor.
        self.owner = unit.owner;

        if self.ticks_left > 0 {
            self.ticks_left -= 1;
            return Ok(());
        }
        world.delete_unit(construction);
        // The structure's own execution charges its owner; the payer gets the
        // site's price back even if the site was captured.
        if let Some(p) = world.player_mut(self.payer) {
            p.gold = p.gold.saturating_add(self.cost);
        }
        queue.extend(unit_execution(self.owner, self.unit_type, self.tile));
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::tests::coastal_world;

    fn rich_world() -> World {
        let mut world = coastal_world();
        for tile in 0..60 {
            world.conquer(1, tile);
        }
        world.player_mut(1).unwrap().gold = 1_000_000;
        world
    }

    fn run(exec: &mut ConstructionExecution, world: &mut World) -> ExecutionQueue {
        let mut queue = Vec::new();
        for _ in 0..200 {
            if !exec.is_active() {
                break;
            }
            exec.tick(world, &mut queue).unwrap();
        }
        queue
    }

    #[test]
    fn test_city_construction() {
        let mut world = rich_world();
        let mut exec = ConstructionExecution::new(1, UnitType::City, 22);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        let site = exec.construction.unwrap();
        assert_eq!(world.unit(site).unwrap().construction_type, Some(UnitType::City));
        assert_eq!(world.player(1).unwrap().gold, 875_000);

        let queue = run(&mut exec, &mut world);
        assert!(!world.unit(site).unwrap().active);
        assert_eq!(world.player(1).unwrap().gold, 1_000_000);
        assert!(matches!(queue.as_slice(), [Execution::City(_)]));

        // The city execution charges again when it builds.
        let mut queue = queue;
        if let Some(Execution::City(city)) = queue.first_mut() {
            city.tick(&mut world, &mut Vec::new()).unwrap();
        }
        assert_eq!(world.units_of(1, UnitType::City).len(), 1);
        assert_eq!(world.player(1).unwrap().gold, 875_000);
    }

    #[test]
    fn test_takes_construction_duration() {
        let mut world = rich_world();
        let mut exec = ConstructionExecution::new(1, UnitType::DefensePost, 22);
        let mut ticks = 0;
        let mut queue = Vec::new();
        while exec.is_active() {
            exec.tick(&mut world, &mut queue).unwrap();
            ticks += 1;
        }
        // One tick to start, then the full duration, then one to finish.
        assert_eq!(ticks, 1 + 50 + 1);
    }

    #[test]
    fn test_destroyed_site_cancels() {
        let mut world = rich_world();
        let mut exec = ConstructionExecution::new(1, UnitType::City, 22);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        world.delete_unit(exec.construction.unwrap());
        let queue = run(&mut exec, &mut world);
        assert!(queue.is_empty());
        assert_eq!(world.player(1).unwrap().gold, 875_000);
    }

    #[test]
    fn test_captured_site_finishes_for_captor() {
        let mut world = rich_world();
        let mut exec = ConstructionExecution::new(1, UnitType::City, 22);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        let captor_gold = world.player(2).unwrap().gold;
        world.conquer(2, 22);
        let queue = run(&mut exec, &mut world);
        assert_eq!(exec.owner, 2);
        assert!(matches!(queue.as_slice(), [Execution::City(_)]));
        // Only the player who paid is refunded.
        assert_eq!(world.player(1).unwrap().gold, 1_000_000);
        assert_eq!(world.player(2).unwrap().gold, captor_gold);
    }

    #[test]
    fn test_instant_types_skip_construction() {
        let mut world = rich_world();
        world.build_unit(UnitType::Port, 1, 55, UnitParams::default());
        world.player_mut(1).unwrap().gold = 1_000_000;
        let mut exec = ConstructionExecution::new(1, UnitType::Warship, 57);
        let mut queue = Vec::new();
        exec.tick(&mut world, &mut queue).unwrap();
        assert!(!exec.is_active());
        assert!(exec.construction.is_none());
        assert!(matches!(queue.as_slice(), [Execution::Warship(_)]));
    }

    #[test]
    fn test_unknown_unit_types_have_no_execution() {
        assert!(unit_execution(1, UnitType::Shell, 0).is_none());
        assert!(matches!(unit_execution(1, UnitType::Port, 5), Some(Execution::Port(_))));
    }
}
