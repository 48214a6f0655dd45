//! Protocol Messages
//!
//! Wire format for relay-client communication over WebSocket. Every frame
//! is a JSON object tagged by `type` with camelCase fields.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::config::GameConfig;
use crate::game::intent::{Intent, Turn};
use crate::game::player::ClientId;
use crate::game::runner::GameStartInfo;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A valid message arrived where another type was required.
    #[error("expected {expected} message, got {got}")]
    Unexpected {
        /// Required message type.
        expected: &'static str,
        /// Received message type.
        got: &'static str,
    },
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// First frame on a connection: attach to a game.
    Join {
        /// Client id.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// Secret bound to the client id on first join.
        #[serde(rename = "persistentID")]
        persistent_id: String,
        /// Game to join.
        #[serde(rename = "gameID")]
        game_id: String,
        /// Display name.
        username: String,
        /// Flag code.
        #[serde(default)]
        flag: String,
        /// First turn the client is missing.
        #[serde(default)]
        last_turn: usize,
    },

    /// Submit an intent for the current turn.
    Intent {
        /// Client id.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// Persistent id.
        #[serde(rename = "persistentID")]
        persistent_id: String,
        /// Game the intent is for.
        #[serde(rename = "gameID")]
        game_id: String,
        /// The intent.
        intent: Intent,
    },

    /// Liveness heartbeat.
    Ping {
        /// Client id.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// Persistent id.
        #[serde(rename = "persistentID")]
        persistent_id: String,
    },

    /// State hash computed by the client's replica after a turn.
    Hash {
        /// Client id.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// Persistent id.
        #[serde(rename = "persistentID")]
        persistent_id: String,
        /// Turn the hash was taken at.
        turn_number: usize,
        /// World hash.
        hash: u64,
    },

    /// End-of-game report.
    Winner {
        /// Client id.
        #[serde(rename = "clientID")]
        client_id: ClientId,
        /// Persistent id.
        #[serde(rename = "persistentID")]
        persistent_id: String,
        /// Winning player or team.
        #[serde(default)]
        winner: Option<String>,
        /// `player` or `team`.
        #[serde(default)]
        winner_type: Option<String>,
        /// Opaque per-player statistics, archived as sent.
        #[serde(default)]
        all_players_stats: serde_json::Value,
    },
}

impl ClientMessage {
    /// Sender's client id.
    pub fn client_id(&self) -> &ClientId {
        match self {
            Self::Join { client_id, .. }
            | Self::Intent { client_id, .. }
            | Self::Ping { client_id, .. }
            | Self::Hash { client_id, .. }
            | Self::Winner { client_id, .. } => client_id,
        }
    }

    /// Sender's persistent id.
    pub fn persistent_id(&self) -> &str {
        match self {
            Self::Join { persistent_id, .. }
            | Self::Intent { persistent_id, .. }
            | Self::Ping { persistent_id, .. }
            | Self::Hash { persistent_id, .. }
            | Self::Winner { persistent_id, .. } => persistent_id,
        }
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Intent { .. } => "intent",
            Self::Ping { .. } => "ping",
            Self::Hash { .. } => "hash",
            Self::Winner { .. } => "winner",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from relay to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A completed turn.
    Turn {
        /// The turn.
        turn: Turn,
    },

    /// The game is about to start; load the map.
    Prestart {
        /// Map name.
        game_map: String,
    },

    /// The game has started. Late joiners receive the turns they missed.
    Start {
        /// Turn log from the requested index.
        turns: Vec<Turn>,
        /// Roster and rules.
        game_start_info: GameStartInfo,
    },

    /// The client's replica disagrees with the majority.
    Desync {
        /// Turn that was checked.
        turn: usize,
        /// Majority hash, if any client reported one.
        correct_hash: Option<u64>,
        /// Clients that reported the majority hash.
        clients_with_correct_hash: usize,
        /// Active clients at the time of the check.
        total_active_clients: usize,
    },

    /// Request could not be served.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

// =============================================================================
// LOBBY METADATA
// =============================================================================

/// A client as shown in the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyClient {
    /// Display name.
    pub username: String,
    /// Client id.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
}

/// Lobby listing for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    /// Game id.
    #[serde(rename = "gameID")]
    pub game_id: String,
    /// Currently active clients.
    pub clients: Vec<LobbyClient>,
    /// Rules.
    pub game_config: GameConfig,
    /// Milliseconds until a public game starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms_until_start: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::intent::IntentKind;

    #[test]
    fn test_join_wire_names() {
        let json = r#"{"type":"join","clientID":"c1","persistentID":"p1","gameID":"g1","username":"ann","lastTurn":4}"#;
        let msg = ClientMessage::from_json(json).unwrap();
        assert_eq!(msg.kind(), "join");
        assert_eq!(msg.client_id(), &ClientId::new("c1"));
        assert_eq!(msg.persistent_id(), "p1");
        match msg {
            ClientMessage::Join { game_id, last_turn, flag, .. } => {
                assert_eq!(game_id, "g1");
                assert_eq!(last_turn, 4);
                assert_eq!(flag, "");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_intent_message_carries_intent() {
        let msg = ClientMessage::Intent {
            client_id: ClientId::new("c1"),
            persistent_id: "p1".to_string(),
            game_id: "g1".to_string(),
            intent: Intent::new(ClientId::new("c1"), IntentKind::Spawn { tile: 7 }),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "intent");
        assert_eq!(value["gameID"], "g1");
        assert_eq!(value["intent"]["type"], "spawn");
        assert_eq!(value["intent"]["tile"], 7);
    }

    #[test]
    fn test_hash_message_fields() {
        let json = r#"{"type":"hash","clientID":"c1","persistentID":"p1","turnNumber":20,"hash":12345}"#;
        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::Hash { turn_number, hash, .. } => {
                assert_eq!(turn_number, 20);
                assert_eq!(hash, 12345);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_desync_wire_shape() {
        let msg = ServerMessage::Desync {
            turn: 10,
            correct_hash: Some(99),
            clients_with_correct_hash: 3,
            total_active_clients: 4,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "desync");
        assert_eq!(value["correctHash"], 99);
        assert_eq!(value["clientsWithCorrectHash"], 3);
        assert_eq!(value["totalActiveClients"], 4);
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            ClientMessage::from_json("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(ClientMessage::from_json(r#"{"type":"teleport","clientID":"c"}"#).is_err());
    }
}
