//! Core deterministic primitives.
//!
//! Everything the simulation needs to stay bit-identical across replicas:
//! seeded randomness, canonical state hashing and the rounding helpers.

pub mod rng;
pub mod hash;
pub mod math;

// Re-export core types
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, fold_hash, StateHash, StateHasher};
pub use math::within;
