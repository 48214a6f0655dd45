//! Victory condition.

use tracing::info;

use crate::execution::{ExecutionBehavior, ExecutionQueue};
use crate::game::tick::TickError;
use crate::game::world::World;

/// Ticks between checks.
const CHECK_INTERVAL: u32 = 10;

/// Declares the first player owning more than the configured share of all
/// land the winner.
#[derive(Debug)]
pub struct WinCheckExecution {
    active: bool,
}

impl WinCheckExecution {
    /// Registered once when the game starts.
    pub fn new() -> Self {
        Self { active: true }
    }
}

impl Default for WinCheckExecution {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBehavior for WinCheckExecution {
    fn tick(&mut self, world: &mut World, _queue: &mut ExecutionQueue) -> Result<(), TickError> {
        if world.ticks() % CHECK_INTERVAL != 0 || world.winner().is_some() {
            return Ok(());
        }
        let Some(leader) = world
            .players()
            .iter()
            .filter(|p| p.is_alive())
            .max_by_key(|p| (p.num_tiles_owned(), std::cmp::Reverse(p.small_id)))
        else {
            return Ok(());
        };
        let land = world.map().num_land_tiles() as u64;
        let threshold = world.config().win_threshold_percent() as u64;
        if leader.num_tiles_owned() * 100 > land * threshold {
            let winner = leader.small_id;
            info!(winner, tiles = leader.num_tiles_owned(), land, "winner decided");
            world.set_winner(winner);
            self.active = false;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
