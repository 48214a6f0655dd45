//! Connected Clients
//!
//! One [`Client`] per WebSocket connection attached to a game. The session
//! writes to it through an unbounded channel drained by the connection's
//! writer task.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

use crate::game::player::{ClientId, PlayerId};
use crate::network::protocol::ServerMessage;

/// Identifies one physical connection. A reconnecting client gets a new one.
pub type ConnectionId = u64;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)
}

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized server message.
    Text(String),
    /// Close the connection with a reason, then stop writing.
    Close(String),
}

/// A client attached to a game session.
#[derive(Debug)]
pub struct Client {
    /// Client id chosen by the client.
    pub client_id: ClientId,
    /// Secret bound to the client id.
    pub persistent_id: String,
    /// Player id assigned by the relay.
    pub player_id: PlayerId,
    /// Remote address.
    pub ip: IpAddr,
    /// Display name.
    pub username: String,
    /// Flag code.
    pub flag: String,
    /// Connection the client is attached through.
    pub connection: ConnectionId,
    /// Last heartbeat.
    pub last_ping: Instant,
    /// Reported state hashes by turn number.
    pub hashes: BTreeMap<usize, u64>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Client {
    /// Create a client with a fresh player id.
    pub fn new(
        client_id: ClientId,
        persistent_id: String,
        ip: IpAddr,
        username: String,
        flag: String,
        connection: ConnectionId,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let mut player_id = uuid::Uuid::new_v4().simple().to_string();
        player_id.truncate(8);
        Self {
            client_id,
            persistent_id,
            player_id: PlayerId::new(player_id),
            ip,
            username,
            flag,
            connection,
            last_ping: Instant::now(),
            hashes: BTreeMap::new(),
            outbound,
        }
    }

    /// Queue an already-serialized frame.
    pub fn send_text(&self, text: &str) {
        if self.outbound.send(Outbound::Text(text.to_string())).is_err() {
            debug!(client = %self.client_id, "send on closed connection");
        }
    }

    /// Serialize and queue a message.
    pub fn send(&self, msg: &ServerMessage) {
        match msg.to_json() {
            Ok(text) => self.send_text(&text),
            Err(e) => debug!(client = %self.client_id, "failed to serialize message: {}", e),
        }
    }

    /// Ask the writer task to close the connection.
    pub fn close(&self, reason: &str) {
        let _ = self.outbound.send(Outbound::Close(reason.to_string()));
    }

    /// Another sender for this client's connection.
    pub fn outbound(&self) -> mpsc::UnboundedSender<Outbound> {
        self.outbound.clone()
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}
