//! Nukes
//!
//! A nuke launches from the owner's closest ready silo, flies straight at
//! its target and detonates on arrival. Tiles inside the inner radius are
//! always hit; tiles between the inner and outer radius are hit with even
//! odds. Hit tiles lose their owner, kill part of the owner's population
//! and turn to fallout. Every non-nuke unit inside the outer radius dies.

use tracing::info;

use crate::core::math::floor_u64;
use crate::core::DeterministicRng;
use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::formulas::nuke_death_factor;
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::{UnitId, UnitType};
use crate::game::updates::MessageType;
use crate::game::world::{UnitParams, World};

/// Unit types a blast destroys.
const BLAST_VICTIMS: [UnitType; 9] = [
    UnitType::TransportShip,
    UnitType::Warship,
    UnitType::Shell,
    UnitType::Port,
    UnitType::TradeShip,
    UnitType::MissileSilo,
    UnitType::DefensePost,
    UnitType::City,
    UnitType::Construction,
];

/// A nuke in flight.
#[derive(Debug)]
pub struct NukeExecution {
    owner: SmallId,
    unit_type: UnitType,
    dst: TileRef,
    nuke: Option<UnitId>,
    active: bool,
}

impl NukeExecution {
    /// Launch a nuke of `unit_type` (atom or hydrogen bomb) at `dst`.
    pub fn new(owner: SmallId, unit_type: UnitType, dst: TileRef) -> Self {
        Self { owner, unit_type, dst, nuke: None, active: true }
    }

    /// The nuke unit, once launched.
    pub fn nuke(&self) -> Option<UnitId> {
        self.nuke
    }

    fn launch(&mut self, world: &mut World) -> Option<UnitId> {
        let Some(spawn) = world.can_build(self.owner, self.unit_type, self.dst) else {
            self.active = false;
            return None;
        };
        let silo = world
            .units_of(self.owner, UnitType::MissileSilo)
            .into_iter()
            .find(|&id| world.unit(id).map(|s| s.tile == spawn && !s.in_cooldown()).unwrap_or(false));
        let params = UnitParams { detonation_dst: Some(self.dst), ..Default::default() };
        let nuke = world.build_unit(self.unit_type, self.owner, spawn, params);
        if let Some(silo) = silo {
            let now = world.ticks();
            world.set_cooldown(silo, Some(now));
        }
        info!(owner = self.owner, unit_type = ?self.unit_type, dst = self.dst, "nuke launched");
        self.nuke = Some(nuke);
        Some(nuke)
    }

    fn detonate(&mut self, world: &mut World, nuke: UnitId) {
        let Some((inner, outer)) = self.unit_type.nuke_magnitude() else {
            world.delete_unit(nuke);
            self.active = false;
            return;
        };
        let mut rng = DeterministicRng::for_entity(0x4E55_0000_0000_0000 | nuke.0 as u64, world.ticks());
        let inner2 = inner as u64 * inner as u64;
        let hit: Vec<TileRef> = world
            .map()
            .tiles_within(self.dst, outer)
            .into_iter()
            .filter(|&t| world.map().euclidean_dist_squared(t, self.dst) <= inner2 || rng.chance(2))
            .collect();

        for &tile in &hit {
            let owner = world.owner_id(tile);
            if let Some(p) = world.player_mut(owner) {
                let tiles = p.num_tiles_owned();
                let troops = floor_u64(nuke_death_factor(p.troops as f64, tiles));
                let workers = floor_u64(nuke_death_factor(p.workers as f64, tiles));
                p.troops = p.troops.saturating_sub(troops);
                p.workers = p.workers.saturating_sub(workers);
            }
            world.relinquish(tile);
            if world.map().is_land(tile) {
                world.set_fallout(tile, true);
            }
        }

        let victims: Vec<UnitId> = world
            .nearby_units(self.dst, outer, &BLAST_VICTIMS)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in victims {
            world.delete_unit(id);
        }
        world.delete_unit(nuke);
        world.display_message(
            format!("{:?} detonated", self.unit_type),
            MessageType::Error,
            None,
        );
        self.active = false;
    }
}

impl ExecutionBehavior for NukeExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let nuke = match self.nuke {
            Some(id) => id,
            None => match self.launch(world) {
                Some(id) => id,
                None => return Ok(()),
            },
        };
        let Some(unit) = world.active_unit(nuke) else {
            self.active = false;
            return Ok(());
        };
        let mut at = unit.tile;
        for _ in 0..world.config().nuke_speed {
            if at == self.dst {
                self.detonate(world, nuke);
                return Ok(());
            }
            at = world.map().step_toward(at, self.dst);
            world.move_unit(nuke, at);
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
    use crate::game::config::GameConfig;
    use crate::game::map::GameMap;
    use crate::game::player::PlayerType;
    use crate::game::world::tests::info;

    /// 60x60 land map; player 1 owns a silo in the corner, player 2 owns
    /// the far half.
    fn silo_world() -> (World, UnitId) {
        let rows: Vec<String> = (0..60).map(|_| ".".repeat(60)).collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let map = GameMap::from_ascii(&rows).unwrap();
        let mut world = World::new(
            map,
            GameConfig::default(),
            vec![info("a", PlayerType::Human), info("b", PlayerType::Human)],
        );
        world.conquer(1, 0);
        for y in 0..60 {
            for x in 30..60 {
                world.conquer(2, y * 60 + x);
            }
        }
        let silo = world.build_unit(UnitType::MissileSilo, 1, 0, UnitParams::default());
        world.player_mut(1).unwrap().gold = 10_000_000;
        (world, silo)
    }

    fn fly(exec: &mut NukeExecution, world: &mut World) {
        for _ in 0..100 {
            if !exec.is_active() {
                break;
            }
            exec.tick(world, &mut Vec::new()).unwrap();
        }
    }

    #[test]
    fn test_launch_puts_silo_on_cooldown() {
        let (mut world, silo) = silo_world();
        let dst = 30 * 60 + 45;
        let mut exec = NukeExecution::new(1, UnitType::AtomBomb, dst);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(world.unit(silo).unwrap().in_cooldown());
        assert_eq!(world.player(1).unwrap().gold, 10_000_000 - 750_000);

        // A second launch needs a ready silo.
        let mut second = NukeExecution::new(1, UnitType::AtomBomb, dst);
        second.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(!second.is_active());
    }

    #[test]
    fn test_detonation_clears_inner_radius() {
        let (mut world, _) = silo_world();
        let dst = 30 * 60 + 45;
        let troops_before = world.player(2).unwrap().troops;
        let city = world.build_unit(UnitType::City, 2, dst + 3, UnitParams::default());
        let mut exec = NukeExecution::new(1, UnitType::AtomBomb, dst);
        fly(&mut exec, &mut world);

        assert!(!exec.is_active());
        assert!(!world.unit(exec.nuke().unwrap()).unwrap().active);
        assert!(!world.unit(city).unwrap().active);
        for tile in world.map().tiles_within(dst, 12) {
            assert!(!world.has_owner(tile));
            assert!(world.has_fallout(tile));
        }
        assert!(world.player(2).unwrap().troops < troops_before);
        // Outside the outer radius nothing changes.
        assert_eq!(world.owner_id(59), 2);
    }

    #[test]
    fn test_disabled_nukes() {
        let (world, _) = silo_world();
        let mut config = world.config().clone();
        config.disable_nukes = true;
        let mut world = World::new(world.map().clone(), config, vec![info("a", PlayerType::Human)]);
        world.conquer(1, 0);
        world.build_unit(UnitType::MissileSilo, 1, 0, UnitParams::default());
        world.player_mut(1).unwrap().gold = 10_000_000;
        let mut exec = NukeExecution::new(1, UnitType::AtomBomb, 100);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(!exec.is_active());
        assert!(exec.nuke().is_none());
    }
}
