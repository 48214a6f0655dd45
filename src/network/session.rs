//! Game Session
//!
//! The relay's state for one game: attached clients, the pending intent
//! buffer, the turn log and per-client hash reports. A session is owned by
//! a single task (see [`crate::network::manager`]); nothing here locks or
//! awaits. Every method that depends on time takes `now` explicitly.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::game::config::{GameConfig, GameType};
use crate::game::intent::{Intent, Turn};
use crate::game::player::ClientId;
use crate::game::runner::{GameStartInfo, StartPlayer};
use crate::network::archive::{Archive, GameRecord, PlayerRecord};
use crate::network::client::{Client, ConnectionId};
use crate::network::config::ServerConfig;
use crate::network::protocol::{ClientMessage, GameInfo, LobbyClient, ServerMessage};

/// Hash reports are cross-checked every this many turns.
pub const SYNC_CHECK_INTERVAL: usize = 10;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// Accepting players, not started.
    Lobby,
    /// Running, or about to run.
    Active,
    /// Should be ended and removed.
    Finished,
}

/// Session errors.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// No game with this id on this worker.
    #[error("game {0} not found")]
    GameNotFound(String),

    /// A game with this id already exists.
    #[error("game {0} already exists")]
    GameExists(String),

    /// The session task has shut down.
    #[error("game {0} has ended")]
    Closed(String),

    /// Too many active clients share this address.
    #[error("too many clients from {0}")]
    IpLimit(IpAddr),

    /// Client id is bound to a different persistent id.
    #[error("client {0} does not match its persistent id")]
    IdentityMismatch(ClientId),

    /// Public games start on their own schedule.
    #[error("game {0} is public")]
    PublicGame(String),
}

#[derive(Debug, Clone)]
struct WinnerReport {
    winner: Option<String>,
    winner_type: Option<String>,
    stats: serde_json::Value,
}

/// Relay state of one game.
pub struct GameSession {
    id: String,
    config: GameConfig,
    server: Arc<ServerConfig>,
    archive: Arc<dyn Archive>,
    created_at: Instant,

    turns: Vec<Turn>,
    intents: Vec<Intent>,
    active: Vec<Client>,
    /// Every client that ever joined, for identity checks and the record.
    known: BTreeMap<ClientId, PlayerRecord>,
    inbound: VecDeque<(ConnectionId, String)>,
    desync_notified: BTreeSet<ClientId>,

    has_prestarted: bool,
    has_started: bool,
    ended: bool,
    started_at: Option<DateTime<Utc>>,
    last_ping_update: Option<Instant>,
    winner: Option<WinnerReport>,
    start_info: Option<GameStartInfo>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("turns", &self.turns.len())
            .field("active", &self.active.len())
            .field("started", &self.has_started)
            .finish()
    }
}

impl GameSession {
    /// Create a session in the lobby.
    pub fn new(
        id: impl Into<String>,
        config: GameConfig,
        server: Arc<ServerConfig>,
        archive: Arc<dyn Archive>,
        now: Instant,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            server,
            archive,
            created_at: now,
            turns: Vec::new(),
            intents: Vec::new(),
            active: Vec::new(),
            known: BTreeMap::new(),
            inbound: VecDeque::new(),
            desync_notified: BTreeSet::new(),
            has_prestarted: false,
            has_started: false,
            ended: false,
            started_at: None,
            last_ping_update: None,
            winner: None,
            start_info: None,
        }
    }

    /// Game id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this is a public matchmade game.
    pub fn is_public(&self) -> bool {
        self.config.game_type == GameType::Public
    }

    /// Whether `prestart` has run.
    pub fn has_prestarted(&self) -> bool {
        self.has_prestarted
    }

    /// Whether `start` has run.
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    /// Number of active clients.
    pub fn num_clients(&self) -> usize {
        self.active.len()
    }

    /// The turn log.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append an intent to the current turn.
    pub fn add_intent(&mut self, intent: Intent) {
        self.intents.push(intent);
    }

    /// Attach a client, replacing any connection it already has.
    pub fn add_client(&mut self, client: Client, last_turn: usize, now: Instant) -> Result<(), SessionError> {
        info!(
            game = %self.id,
            client = %client.client_id,
            ip = %client.ip,
            rejoin = last_turn > 0,
            "client (re)joining game"
        );

        if let Some(record) = self.known.get(&client.client_id) {
            if record.persistent_id != client.persistent_id {
                warn!(game = %self.id, client = %client.client_id, "join with mismatched persistent id");
                return Err(SessionError::IdentityMismatch(client.client_id));
            }
        }

        if self.is_public() {
            let same_ip = self
                .active
                .iter()
                .filter(|c| c.ip == client.ip && c.client_id != client.client_id)
                .count();
            if same_ip >= self.server.max_clients_per_ip {
                warn!(game = %self.id, client = %client.client_id, ip = %client.ip, "ip limit reached");
                return Err(SessionError::IpLimit(client.ip));
            }
        }

        if let Some(pos) = self.active.iter().position(|c| c.client_id == client.client_id) {
            // Frames received before the reconnect still count.
            self.drain_inbound(now);
            let old = self.active.remove(pos);
            debug!(game = %self.id, client = %old.client_id, connection = old.connection, "detaching old connection");
            old.close("reconnected from another connection");
        }

        let mut client = client;
        client.last_ping = now;
        self.known.insert(
            client.client_id.clone(),
            PlayerRecord {
                ip: client.ip,
                client_id: client.client_id.clone(),
                username: client.username.clone(),
                persistent_id: client.persistent_id.clone(),
            },
        );

        // Late joiners missed the start message.
        if self.has_started {
            if let Some(info) = &self.start_info {
                let from = last_turn.min(self.turns.len());
                client.send(&ServerMessage::Start {
                    turns: self.turns[from..].to_vec(),
                    game_start_info: info.clone(),
                });
            }
        }
        self.active.push(client);
        Ok(())
    }

    /// Drop the client attached through `connection`, if any. Frames it sent
    /// before closing are processed first.
    pub fn disconnect(&mut self, connection: ConnectionId, now: Instant) {
        self.drain_inbound(now);
        if let Some(pos) = self.active.iter().position(|c| c.connection == connection) {
            let client = self.active.remove(pos);
            info!(game = %self.id, client = %client.client_id, "client disconnected");
        }
    }

    /// Queue a raw frame received on `connection`.
    pub fn queue_inbound(&mut self, connection: ConnectionId, text: String) {
        self.inbound.push_back((connection, text));
    }

    /// Process every queued frame.
    pub fn drain_inbound(&mut self, now: Instant) {
        while let Some((connection, text)) = self.inbound.pop_front() {
            self.handle_frame(connection, &text, now);
        }
    }

    fn handle_frame(&mut self, connection: ConnectionId, text: &str, now: Instant) {
        let Some(idx) = self.active.iter().position(|c| c.connection == connection) else {
            debug!(game = %self.id, connection, "frame from detached connection ignored");
            return;
        };
        let msg = match ClientMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                info!(game = %self.id, client = %self.active[idx].client_id, "dropping frame: {}", e);
                return;
            }
        };
        if let Some(record) = self.known.get(msg.client_id()) {
            if record.persistent_id != msg.persistent_id() {
                warn!(
                    game = %self.id,
                    client = %msg.client_id(),
                    "client sent incorrect persistent id"
                );
                return;
            }
        }

        match msg {
            ClientMessage::Intent { game_id, intent, client_id, .. } => {
                if game_id == self.id {
                    self.add_intent(intent);
                } else {
                    warn!(game = %self.id, client = %client_id, sent_to = %game_id, "intent for wrong game");
                }
            }
            ClientMessage::Ping { .. } => {
                self.last_ping_update = Some(now);
                self.active[idx].last_ping = now;
            }
            ClientMessage::Hash { turn_number, hash, .. } => {
                self.active[idx].hashes.insert(turn_number, hash);
            }
            ClientMessage::Winner { winner, winner_type, all_players_stats, .. } => {
                self.winner = Some(WinnerReport { winner, winner_type, stats: all_players_stats });
            }
            ClientMessage::Join { .. } => {
                debug!(game = %self.id, client = %self.active[idx].client_id, "repeated join ignored");
            }
        }
    }

    /// Close the buffer into a turn, check sync and broadcast it.
    pub fn end_turn(&mut self, now: Instant) {
        self.drain_inbound(now);

        let turn = Turn {
            turn_number: self.turns.len() as u32,
            game_id: self.id.clone(),
            intents: std::mem::take(&mut self.intents),
            hash: None,
        };
        let msg = ServerMessage::Turn { turn: turn.clone() };
        self.turns.push(turn);

        self.handle_synchronization();

        let text = match msg.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(game = %self.id, "failed to serialize turn: {}", e);
                return;
            }
        };
        for client in &self.active {
            client.send_text(&text);
        }
    }

    fn handle_synchronization(&mut self) {
        if self.active.len() <= 1 {
            return;
        }
        if self.turns.len() < SYNC_CHECK_INTERVAL || self.turns.len() % SYNC_CHECK_INTERVAL != 0 {
            return;
        }

        let turn = self.turns.len() - SYNC_CHECK_INTERVAL;
        let (majority, out_of_sync) = self.find_out_of_sync(turn);
        if out_of_sync.is_empty() {
            self.turns[turn].hash = majority;
            return;
        }

        let desync = ServerMessage::Desync {
            turn,
            correct_hash: majority,
            clients_with_correct_hash: self.active.len() - out_of_sync.len(),
            total_active_clients: self.active.len(),
        };
        let text = match desync.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(game = %self.id, "failed to create desync message: {}", e);
                return;
            }
        };
        for idx in out_of_sync {
            let client = &self.active[idx];
            if !self.desync_notified.insert(client.client_id.clone()) {
                continue;
            }
            info!(game = %self.id, client = %client.client_id, turn, "sending desync to client");
            client.send_text(&text);
        }
    }

    /// Majority hash for `turn` and the indices of active clients that
    /// disagree with it.
    ///
    /// Ties go to the hash seen first in client order. When at least half
    /// of the active clients disagree, every active client is returned.
    fn find_out_of_sync(&self, turn: usize) -> (Option<u64>, Vec<usize>) {
        let mut counts: Vec<(u64, usize)> = Vec::new();
        for client in &self.active {
            if let Some(&hash) = client.hashes.get(&turn) {
                match counts.iter_mut().find(|(h, _)| *h == hash) {
                    Some(entry) => entry.1 += 1,
                    None => counts.push((hash, 1)),
                }
            }
        }

        let mut majority = None;
        let mut max_count = 0;
        for &(hash, count) in &counts {
            if count > max_count {
                majority = Some(hash);
                max_count = count;
            }
        }

        let out_of_sync: Vec<usize> = self
            .active
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.hashes.get(&turn), Some(h) if Some(*h) != majority))
            .map(|(i, _)| i)
            .collect();

        if out_of_sync.len() >= self.active.len() / 2 {
            return (majority, (0..self.active.len()).collect());
        }
        (majority, out_of_sync)
    }

    /// Drop silent clients and classify the session.
    pub fn phase(&mut self, now: Instant) -> GamePhase {
        let timeout = self.server.ping_timeout;
        let id = &self.id;
        self.active.retain(|client| {
            let alive = now.saturating_duration_since(client.last_ping) <= timeout;
            if !alive {
                info!(game = %id, client = %client.client_id, "no pings received, terminating connection");
                client.close("no heartbeats received, closing connection");
            }
            alive
        });

        let age = now.saturating_duration_since(self.created_at);
        if age > self.server.max_game_duration {
            warn!(game = %self.id, "game past max duration");
            return GamePhase::Finished;
        }

        let no_recent_pings = self
            .last_ping_update
            .map_or(true, |t| now.saturating_duration_since(t) > self.server.quiet_period);
        let no_active = self.active.is_empty();

        if !self.is_public() {
            if !self.has_started {
                return GamePhase::Lobby;
            }
            if no_active && no_recent_pings {
                info!(game = %self.id, "private game complete");
                return GamePhase::Finished;
            }
            return GamePhase::Active;
        }

        let lobby_open = age < self.server.game_creation_rate;
        let not_full = self.config.max_players > 0 && self.active.len() < self.config.max_players;
        if lobby_open && not_full {
            return GamePhase::Lobby;
        }
        let warmup_over = age > self.server.game_creation_rate + self.server.public_warmup;
        if no_active && warmup_over && no_recent_pings {
            return GamePhase::Finished;
        }
        GamePhase::Active
    }

    /// Tell clients to load the map. Runs once.
    pub fn prestart(&mut self) {
        if self.has_prestarted || self.has_started {
            return;
        }
        self.has_prestarted = true;
        let msg = ServerMessage::Prestart { game_map: self.config.game_map.clone() };
        for client in &self.active {
            info!(game = %self.id, client = %client.client_id, "sending prestart message");
            client.send(&msg);
        }
    }

    /// Freeze the roster and start the game. Runs once.
    pub fn start(&mut self, now: Instant) {
        if self.has_started {
            return;
        }
        self.has_started = true;
        self.started_at = Some(Utc::now());
        // Counts as a ping so an empty game is not ended immediately.
        self.last_ping_update = Some(now);

        let info = GameStartInfo {
            game_id: self.id.clone(),
            config: self.config.clone(),
            players: self
                .active
                .iter()
                .map(|c| StartPlayer {
                    player_id: c.player_id.clone(),
                    client_id: c.client_id.clone(),
                    username: c.username.clone(),
                    flag: c.flag.clone(),
                })
                .collect(),
        };
        let msg = ServerMessage::Start { turns: Vec::new(), game_start_info: info.clone() };
        self.start_info = Some(info);
        for client in &self.active {
            info!(game = %self.id, client = %client.client_id, "sending start message");
            client.send(&msg);
        }
    }

    /// Close every connection and archive the game if it was played.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        for client in self.active.drain(..) {
            client.close("game has ended");
        }

        if !self.has_prestarted || !self.has_started {
            info!(game = %self.id, "game not started, not archiving game");
            return;
        }
        if self.known.is_empty() {
            info!(game = %self.id, "no clients joined, not archiving game");
            return;
        }
        let Some(start_info) = self.start_info.clone() else {
            return;
        };
        info!(game = %self.id, turns = self.turns.len(), "ending game");

        let end = Utc::now();
        let start = self.started_at.unwrap_or(end);
        let winner = self.winner.take();
        let turns = std::mem::take(&mut self.turns);
        let record = GameRecord {
            id: self.id.clone(),
            game_start_info: start_info,
            players: self.known.values().cloned().collect(),
            num_turns: turns.len(),
            turns,
            start_timestamp: start,
            end_timestamp: end,
            duration_seconds: (end - start).num_seconds(),
            winner: winner.as_ref().and_then(|w| w.winner.clone()),
            winner_type: winner.as_ref().and_then(|w| w.winner_type.clone()),
            all_players_stats: winner.map(|w| w.stats).unwrap_or(serde_json::Value::Null),
            version: crate::VERSION.to_string(),
        };
        if let Err(e) = self.archive.archive(record) {
            error!(game = %self.id, "error archiving game record: {}", e);
        }
    }

    /// Lobby listing.
    pub fn game_info(&self, now: Instant) -> GameInfo {
        let ms_until_start = self.is_public().then(|| {
            (self.created_at + self.server.game_creation_rate)
                .saturating_duration_since(now)
                .as_millis() as u64
        });
        GameInfo {
            game_id: self.id.clone(),
            clients: self
                .active
                .iter()
                .map(|c| LobbyClient { username: c.username.clone(), client_id: c.client_id.clone() })
                .collect(),
            game_config: self.config.clone(),
            ms_until_start,
        }
    }
}
