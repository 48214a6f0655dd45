//! # Warfront Server
//!
//! Deterministic lockstep engine and turn relay for Warfront territorial
//! conquest.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WARFRONT SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  ├── hash.rs     - State hashing for desync detection        │
//! │  └── math.rs     - Clamp and floor helpers                   │
//! │                                                              │
//! │  game/           - World model and simulation (deterministic)│
//! │  ├── world.rs    - Map, players, units, attacks              │
//! │  ├── formulas.rs - Combat and economy math                   │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  └── runner.rs   - Turn queue and queries for one replica    │
//! │                                                              │
//! │  execution/      - Per-entity behaviors and the scheduler    │
//! │                                                              │
//! │  network/        - Turn relay (non-deterministic)            │
//! │  ├── session.rs  - Turns, hash checks, lifecycle             │
//! │  ├── manager.rs  - Session tasks of one worker               │
//! │  ├── server.rs   - WebSocket front                           │
//! │  └── shard.rs    - Worker routing and supervision            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `game/` and `execution/` modules are **deterministic**:
//! - Floating-point results are floored before they touch state
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given the same start info and turn log, every replica reaches the same
//! world hash at every tick.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod execution;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{GameConfig, GameRunner, GameStartInfo, Intent, IntentKind, Turn, World};
pub use network::{GameManager, ServerConfig, Supervisor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
