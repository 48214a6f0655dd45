//! Player economy: population growth, gold income, troop adjustment.

use crate::core::math::{floor_i64, floor_u64};
use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::formulas::{self, Economy};
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::unit::UnitType;
use crate::game::updates::MessageType;
use crate::game::world::World;

/// Runs a player's economy every tick until the player is eliminated.
#[derive(Debug)]
pub struct PlayerExecution {
    player: SmallId,
    active: bool,
}

impl PlayerExecution {
    /// Economy for `player`.
    pub fn new(player: SmallId) -> Self {
        Self { player, active: true }
    }

    fn eliminate(&mut self, world: &mut World) {
        self.active = false;
        for unit in world.units().iter().filter(|u| u.active && u.owner == self.player).map(|u| u.id).collect::<Vec<_>>() {
            world.delete_unit(unit);
        }
        let outgoing = world.player(self.player).map(|p| p.outgoing_attacks.clone()).unwrap_or_default();
        for attack in outgoing {
            world.delete_attack(attack);
        }
        if let Some(p) = world.player_mut(self.player) {
            p.eliminated = true;
            p.troops = 0;
            p.workers = 0;
        }
        world.display_message("You have been eliminated", MessageType::Error, Some(self.player));
    }
}

impl ExecutionBehavior for PlayerExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        let Some(player) = world.player(self.player) else {
            return Err(TickError::PlayerNotFound(self.player));
        };
        if player.has_spawned && player.tiles.is_empty() {
            self.eliminate(world);
            return Ok(());
        }

        let economy = Economy {
            player_type: player.player_type(),
            tiles_owned: player.num_tiles_owned(),
            cities: world.units_of(self.player, UnitType::City).len() as u64,
            troops: player.troops as f64,
            workers: player.workers as f64,
            target_troop_ratio: player.target_troop_ratio,
        };
        let config = world.config();
        let growth = formulas::population_increase_rate(config, &economy);
        let gold = floor_u64(formulas::gold_addition_rate(&economy));
        let traitor_duration = config.traitor_duration;
        let ticks = world.ticks();

        // Adjustment uses the post-growth population.
        let ratio = economy.target_troop_ratio;
        let grown = Economy {
            troops: economy.troops + floor_u64(growth * ratio) as f64,
            workers: economy.workers + floor_u64(growth * (1.0 - ratio)) as f64,
            ..economy
        };
        let adjustment = floor_i64(formulas::troop_adjustment_rate(config, &grown));

        let Some(p) = world.player_mut(self.player) else {
            return Err(TickError::PlayerNotFound(self.player));
        };
        p.troops = grown.troops as u64;
        p.workers = grown.workers as u64;
        p.gold = p.gold.saturating_add(gold);

        if adjustment >= 0 {
            let moved = (adjustment as u64).min(p.workers);
            p.troops += moved;
            p.workers -= moved;
        } else {
            let moved = adjustment.unsigned_abs().min(p.troops);
            p.troops -= moved;
            p.workers += moved;
        }

        if let Some(since) = p.traitor_since {
            if ticks.saturating_sub(since) >= traitor_duration {
                p.traitor_since = None;
            }
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
    use crate::game::world::tests::coastal_world;

    #[test]
    fn test_population_grows_and_troops_follow_ratio() {
        let mut world = coastal_world();
        for t in 0..6 {
            world.conquer(1, t);
        }
        world.player_mut(1).unwrap().has_spawned = true;
        let before = world.player(1).unwrap().population();

        let mut exec = PlayerExecution::new(1);
        let mut queue = Vec::new();
        for _ in 0..50 {
            exec.tick(&mut world, &mut queue).unwrap();
        }
        let p = world.player(1).unwrap();
        assert!(p.population() > before);
        assert!(p.workers > 0);
        assert!(p.gold > 0);
        assert!(exec.is_active());
    }

    #[test]
    fn test_player_without_land_is_eliminated() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        let ship = world.build_unit(UnitType::Warship, 1, 8, Default::default());
        world.player_mut(1).unwrap().has_spawned = true;
        world.relinquish(0);

        let mut exec = PlayerExecution::new(1);
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(!exec.is_active());
        assert!(world.player(1).unwrap().eliminated);
        assert!(!world.unit(ship).unwrap().active);
    }

    #[test]
    fn test_traitor_flag_expires() {
        let mut world = coastal_world();
        world.conquer(1, 0);
        world.player_mut(1).unwrap().traitor_since = Some(0);
        let mut exec = PlayerExecution::new(1);
        for _ in 0..world.config().traitor_duration {
            world.advance_tick();
        }
        exec.tick(&mut world, &mut Vec::new()).unwrap();
        assert!(!world.player(1).unwrap().is_traitor());
    }
}
