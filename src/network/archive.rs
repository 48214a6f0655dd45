//! Game Archive
//!
//! Finished games are handed to an [`Archive`] as a [`GameRecord`]: enough
//! to replay the game from its start info and turn log. Storage is up to
//! the implementation.

use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::info;

use crate::game::intent::Turn;
use crate::game::player::ClientId;
use crate::game::runner::GameStartInfo;

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend refused the record.
    #[error("archive backend failed: {0}")]
    Backend(String),
}

/// A client that took part in the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Remote address.
    pub ip: IpAddr,
    /// Client id.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    /// Display name.
    pub username: String,
    /// Persistent id.
    #[serde(rename = "persistentID")]
    pub persistent_id: String,
}

/// Everything kept about a finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Game id.
    pub id: String,
    /// Roster and rules the game started with.
    pub game_start_info: GameStartInfo,
    /// Every client that ever joined.
    pub players: Vec<PlayerRecord>,
    /// Full turn log.
    pub turns: Vec<Turn>,
    /// Start time.
    pub start_timestamp: DateTime<Utc>,
    /// End time.
    pub end_timestamp: DateTime<Utc>,
    /// Whole seconds between start and end.
    pub duration_seconds: i64,
    /// Number of turns played.
    pub num_turns: usize,
    /// Reported winner.
    pub winner: Option<String>,
    /// Reported winner kind.
    pub winner_type: Option<String>,
    /// Per-player statistics as reported by the winner message.
    pub all_players_stats: serde_json::Value,
    /// Server version that relayed the game.
    pub version: String,
}

impl GameRecord {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ArchiveError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Storage for finished games.
pub trait Archive: Send + Sync {
    /// Store one record.
    fn archive(&self, record: GameRecord) -> Result<(), ArchiveError>;
}

/// Writes a summary line per game to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogArchive;

impl Archive for LogArchive {
    fn archive(&self, record: GameRecord) -> Result<(), ArchiveError> {
        let size = record.to_json()?.len();
        info!(
            game = %record.id,
            turns = record.num_turns,
            players = record.players.len(),
            duration_s = record.duration_seconds,
            winner = record.winner.as_deref().unwrap_or("-"),
            bytes = size,
            "game archived"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryArchive {
    /// Empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every stored record.
    pub fn records(&self) -> Vec<GameRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Archive for MemoryArchive {
    fn archive(&self, record: GameRecord) -> Result<(), ArchiveError> {
        self.records
            .lock()
            .map_err(|e| ArchiveError::Backend(e.to_string()))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameConfig;
    use std::net::Ipv4Addr;

    fn record() -> GameRecord {
        let start = Utc::now();
        GameRecord {
            id: "g1".to_string(),
            game_start_info: GameStartInfo {
                game_id: "g1".to_string(),
                config: GameConfig::default(),
                players: Vec::new(),
            },
            players: vec![PlayerRecord {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                client_id: ClientId::new("c1"),
                username: "ann".to_string(),
                persistent_id: "p1".to_string(),
            }],
            turns: vec![Turn::empty(0, "g1")],
            start_timestamp: start,
            end_timestamp: start,
            duration_seconds: 0,
            num_turns: 1,
            winner: None,
            winner_type: None,
            all_players_stats: serde_json::Value::Null,
            version: crate::VERSION.to_string(),
        }
    }

    #[test]
    fn test_memory_archive_stores() {
        let archive = MemoryArchive::new();
        archive.archive(record()).unwrap();
        let stored = archive.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].players[0].client_id, ClientId::new("c1"));
    }

    #[test]
    fn test_record_wire_names() {
        let value: serde_json::Value = serde_json::from_str(&record().to_json().unwrap()).unwrap();
        assert_eq!(value["numTurns"], 1);
        assert_eq!(value["players"][0]["clientID"], "c1");
        assert_eq!(value["gameStartInfo"]["gameID"], "g1");
    }

    #[test]
    fn test_log_archive_accepts() {
        assert!(LogArchive.archive(record()).is_ok());
    }
}
