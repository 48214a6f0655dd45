//! Network Layer
//!
//! Turn relay: collects intents from connected clients, closes them into
//! turns on a fixed interval, broadcasts every turn and cross-checks the
//! state hashes replicas report. This layer is **non-deterministic**; the
//! simulation itself runs in the clients through `game/`.

pub mod archive;
pub mod client;
pub mod config;
pub mod manager;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shard;

pub use archive::{Archive, ArchiveError, GameRecord, LogArchive, MemoryArchive, PlayerRecord};
pub use client::{Client, ConnectionId, Outbound};
pub use config::{ConfigError, ServerConfig};
pub use manager::{GameManager, SessionHandle};
pub use protocol::{ClientMessage, GameInfo, ProtocolError, ServerMessage};
pub use server::{ServerError, WorkerServer};
pub use session::{GamePhase, GameSession, SessionError};
pub use shard::{simple_hash, worker_index, worker_port, Supervisor};
