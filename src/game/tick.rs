//! Authoritative Simulation Tick
//!
//! One call to [`execute_next_tick`] processes exactly one turn's worth of
//! simulation. This path must be 100% deterministic: no wall clock, no
//! thread scheduling, no unseeded randomness, no hash-ordered iteration.

use thiserror::Error;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::execution::Scheduler;
use crate::game::attack::AttackId;
use crate::game::formulas::FormulaError;
use crate::game::player::SmallId;
use crate::game::unit::UnitId;
use crate::game::updates::{GameUpdate, GameUpdates};
use crate::game::world::World;

/// A `Hash` update is emitted every this many ticks.
pub const HASH_INTERVAL: u32 = 10;

/// Failure while processing a tick. The runner halts on any of these.
#[derive(Debug, Error)]
pub enum TickError {
    /// A combat or economy formula was fed invalid input.
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// Canonical encoding of world state failed while hashing.
    #[error("state encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    /// An execution referred to a player that does not exist.
    #[error("player {0} not found")]
    PlayerNotFound(SmallId),

    /// An execution referred to a unit that does not exist.
    #[error("{0} not found")]
    UnitNotFound(UnitId),

    /// An execution referred to an attack that does not exist.
    #[error("{0} not found")]
    AttackNotFound(AttackId),
}

/// Run one simulation tick and return the updates it produced.
///
/// # Order
///
/// 1. Execution passes (tick, init, drop inactive), see [`Scheduler::run`]
/// 2. Relation decay
/// 3. Alliance expiry
/// 4. Player snapshots
/// 5. World hash every [`HASH_INTERVAL`] ticks
/// 6. Tick counter increment
pub fn execute_next_tick(world: &mut World, scheduler: &mut Scheduler) -> Result<GameUpdates, TickError> {
    scheduler.run(world)?;

    world.decay_relations();
    world.expire_alliances();

    for id in 1..=world.players().len() as SmallId {
        if let Some(update) = world.player_update(id) {
            world.add_update(GameUpdate::Player(update));
        }
    }

    let tick = world.ticks();
    if tick % HASH_INTERVAL == 0 {
        let hash = world.hash()?;
        #[cfg(feature = "debug-tracing")]
        trace!(tick, hash = %hex::encode(hash.to_be_bytes()), "world hash");
        world.add_update(GameUpdate::Hash { tick, hash });
    }

    world.advance_tick();

    #[cfg(feature = "debug-tracing")]
    trace!(
        tick,
        active = scheduler.active().len(),
        pending = scheduler.pending().len(),
        "tick complete"
    );

    Ok(world.take_updates())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Execution, SpawnExecution};
    use crate::game::updates::GameUpdateType;
    use crate::game::world::tests::coastal_world;

    #[test]
    fn test_empty_tick_advances_by_one() {
        let mut world = coastal_world();
        let mut scheduler = Scheduler::new();
        execute_next_tick(&mut world, &mut scheduler).unwrap();
        assert_eq!(world.ticks(), 1);
        execute_next_tick(&mut world, &mut scheduler).unwrap();
        assert_eq!(world.ticks(), 2);
    }

    #[test]
    fn test_hash_every_interval() {
        let mut world = coastal_world();
        let mut scheduler = Scheduler::new();
        let mut hashes = Vec::new();
        for _ in 0..25 {
            let updates = execute_next_tick(&mut world, &mut scheduler).unwrap();
            for u in updates.get(GameUpdateType::Hash) {
                if let GameUpdate::Hash { tick, .. } = u {
                    hashes.push(*tick);
                }
            }
        }
        assert_eq!(hashes, vec![0, 10, 20]);
    }

    #[test]
    fn test_updates_cleared_between_ticks() {
        let mut world = coastal_world();
        let mut scheduler = Scheduler::new();
        scheduler.add(Execution::Spawn(SpawnExecution::new(1, 22)));
        execute_next_tick(&mut world, &mut scheduler).unwrap();
        let updates = execute_next_tick(&mut world, &mut scheduler).unwrap();
        assert!(!updates.get(GameUpdateType::Tile).is_empty());
        let updates = execute_next_tick(&mut world, &mut scheduler).unwrap();
        assert!(updates.get(GameUpdateType::Tile).is_empty());
        assert_eq!(updates.get(GameUpdateType::Player).len(), 2);
    }

    #[test]
    fn test_same_inputs_same_hash() {
        let run = || {
            let mut world = coastal_world();
            let mut scheduler = Scheduler::new();
            scheduler.add(Execution::Spawn(SpawnExecution::new(1, 22)));
            scheduler.add(Execution::Spawn(SpawnExecution::new(2, 77)));
            for _ in 0..40 {
                execute_next_tick(&mut world, &mut scheduler).unwrap();
            }
            world.hash().unwrap()
        };
        assert_eq!(run(), run());
    }
}
