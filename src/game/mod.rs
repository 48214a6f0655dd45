//! Game Logic Module
//!
//! All game simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `map`: Terrain grid and tile geometry
//! - `player`, `unit`, `attack`: Entity records
//! - `world`: The single mutable game state
//! - `formulas`: Combat and economy math
//! - `pathfinding`: Ocean route queries
//! - `intent`: Player actions and turns
//! - `updates`: Per-tick change stream
//! - `tick`: Authoritative simulation step
//! - `executor`: Intent to execution translation
//! - `runner`: Turn queue, callbacks and queries for one replica
//! - `names`: Name label placement

pub mod attack;
pub mod config;
pub mod executor;
pub mod formulas;
pub mod intent;
pub mod map;
pub mod names;
pub mod pathfinding;
pub mod player;
pub mod runner;
pub mod tick;
pub mod unit;
pub mod updates;
pub mod world;

// Re-export key types
pub use config::GameConfig;
pub use intent::{Intent, IntentKind, Turn};
pub use map::{GameMap, Terrain, TileRef};
pub use player::{ClientId, PlayerId, SmallId};
pub use runner::{GameRunner, GameStartInfo, RunnerUpdate};
pub use tick::{execute_next_tick, TickError};
pub use updates::{GameUpdate, GameUpdateType, GameUpdates};
pub use world::World;
