//! Spawn placement.

use tracing::debug;

use crate::execution::{Execution, ExecutionBehavior, ExecutionQueue, PlayerExecution};
use crate::game::map::TileRef;
use crate::game::player::SmallId;
use crate::game::tick::TickError;
use crate::game::world::World;

/// Claim unowned land around a tile as a player's starting territory.
///
/// During the spawn phase a player may spawn again; the previous territory
/// is released first.
#[derive(Debug)]
pub struct SpawnExecution {
    player: SmallId,
    tile: TileRef,
    active: bool,
}

impl SpawnExecution {
    /// Spawn `player` at `tile`.
    pub fn new(player: SmallId, tile: TileRef) -> Self {
        Self { player, tile, active: true }
    }
}

impl ExecutionBehavior for SpawnExecution {
    fn tick(&mut self, world: &mut World, queue: &mut ExecutionQueue) -> Result<(), TickError> {
        self.active = false;
        if !world.in_spawn_phase() {
            return Ok(());
        }
        if !world.map().is_valid(self.tile) || !world.map().is_land(self.tile) {
            debug!(player = self.player, tile = self.tile, "spawn on invalid tile ignored");
            return Ok(());
        }
        let Some(player) = world.player(self.player) else {
            return Err(TickError::PlayerNotFound(self.player));
        };
        let previous: Vec<TileRef> = player.tiles.iter().copied().collect();
        let first_spawn = !player.has_spawned;

        for tile in previous {
            world.relinquish(tile);
        }

        let radius = world.config().spawn_radius;
        let claim: Vec<TileRef> = world
            .map()
            .tiles_within(self.tile, radius)
            .into_iter()
            .filter(|&t| world.map().is_land(t) && !world.has_owner(t))
            .collect();
        for tile in claim {
            world.conquer(self.player, tile);
        }

        if let Some(p) = world.player_mut(self.player) {
            p.has_spawned = true;
        }
        if first_spawn {
            queue.push(Execution::Player(PlayerExecution::new(self.player)));
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn active_during_spawn_phase(&self) -> bool {
        true
    }
}
