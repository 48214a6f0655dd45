//! Game Manager
//!
//! Owns the sessions hosted by one worker. Each [`GameSession`] runs inside
//! its own task and is driven through a [`SessionHandle`]; the task owns the
//! turn timer and the lifecycle supervision loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::AbortHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::game::config::GameConfig;
use crate::network::archive::Archive;
use crate::network::client::{Client, ConnectionId, Outbound};
use crate::network::config::ServerConfig;
use crate::network::protocol::{GameInfo, ServerMessage};
use crate::network::session::{GamePhase, GameSession, SessionError};

/// Commands accepted by a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Attach a client.
    AddClient {
        /// The client.
        client: Client,
        /// First turn it is missing.
        last_turn: usize,
    },
    /// A frame arrived on a connection.
    Inbound {
        /// Source connection.
        connection: ConnectionId,
        /// Raw frame.
        text: String,
    },
    /// A connection closed.
    Disconnected(ConnectionId),
    /// Start a private lobby.
    Start,
    /// Request lobby metadata.
    Info(oneshot::Sender<GameInfo>),
}

/// Sender side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    public: bool,
    tx: mpsc::UnboundedSender<SessionCommand>,
    task: AbortHandle,
}

impl SessionHandle {
    /// Game id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the game is public.
    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Whether the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(cmd).map_err(|_| SessionError::Closed(self.id.clone()))
    }

    /// Attach a client, replaying turns from `last_turn` if started.
    pub fn add_client(&self, client: Client, last_turn: usize) -> Result<(), SessionError> {
        self.send(SessionCommand::AddClient { client, last_turn })
    }

    /// Forward a raw frame from `connection`.
    pub fn inbound(&self, connection: ConnectionId, text: String) -> Result<(), SessionError> {
        self.send(SessionCommand::Inbound { connection, text })
    }

    /// Report that `connection` closed.
    pub fn disconnected(&self, connection: ConnectionId) -> Result<(), SessionError> {
        self.send(SessionCommand::Disconnected(connection))
    }

    /// Start the game now.
    pub fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start)
    }

    /// Lobby metadata.
    pub async fn game_info(&self) -> Result<GameInfo, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Info(tx))?;
        rx.await.map_err(|_| SessionError::Closed(self.id.clone()))
    }
}

type Registry = Arc<RwLock<BTreeMap<String, SessionHandle>>>;

/// The sessions of one worker.
#[derive(Clone)]
pub struct GameManager {
    config: Arc<ServerConfig>,
    archive: Arc<dyn Archive>,
    games: Registry,
}

impl std::fmt::Debug for GameManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameManager").field("config", &self.config).finish()
    }
}

impl GameManager {
    /// Create an empty manager.
    pub fn new(config: Arc<ServerConfig>, archive: Arc<dyn Archive>) -> Self {
        Self {
            config,
            archive,
            games: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Create a session and spawn its task.
    #[instrument(skip(self, config))]
    pub async fn create_game(&self, id: String, config: GameConfig) -> Result<SessionHandle, SessionError> {
        let mut games = self.games.write().await;
        if games.contains_key(&id) {
            return Err(SessionError::GameExists(id));
        }

        let session = GameSession::new(
            id.clone(),
            config,
            self.config.clone(),
            self.archive.clone(),
            Instant::now(),
        );
        let public = session.is_public();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(session, rx, self.config.clone(), self.games.clone()));
        let handle = SessionHandle { id: id.clone(), public, tx, task: task.abort_handle() };
        games.insert(id.clone(), handle.clone());
        info!(game = %id, public, "game created");
        Ok(handle)
    }

    /// Handle of a hosted game.
    pub async fn game(&self, id: &str) -> Option<SessionHandle> {
        self.games.read().await.get(id).cloned()
    }

    /// Attach a client to a hosted game.
    pub async fn add_client(&self, game_id: &str, client: Client, last_turn: usize) -> Result<(), SessionError> {
        let handle = self
            .game(game_id)
            .await
            .ok_or_else(|| SessionError::GameNotFound(game_id.to_string()))?;
        handle.add_client(client, last_turn)
    }

    /// Start a private lobby.
    pub async fn start_game(&self, id: &str) -> Result<(), SessionError> {
        let handle = self.game(id).await.ok_or_else(|| SessionError::GameNotFound(id.to_string()))?;
        if handle.is_public() {
            info!(game = %id, "cannot start public game");
            return Err(SessionError::PublicGame(id.to_string()));
        }
        handle.start()
    }

    /// Lobby metadata of a hosted game.
    pub async fn game_info(&self, id: &str) -> Result<GameInfo, SessionError> {
        let handle = self.game(id).await.ok_or_else(|| SessionError::GameNotFound(id.to_string()))?;
        handle.game_info().await
    }

    /// Number of hosted games.
    pub async fn game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Abort every session task without ending or archiving its game.
    /// Returns how many games were dropped.
    pub async fn shutdown(&self) -> usize {
        let mut games = self.games.write().await;
        for handle in games.values() {
            handle.task.abort();
        }
        let dropped = games.len();
        games.clear();
        dropped
    }

    /// Ids of hosted public games.
    pub async fn public_game_ids(&self) -> Vec<String> {
        self.games
            .read()
            .await
            .values()
            .filter(|h| h.is_public())
            .map(|h| h.id().to_string())
            .collect()
    }
}

/// Session task: applies commands, ends turns on the turn timer and checks
/// the lifecycle phase on the supervision timer.
async fn run_session(
    mut session: GameSession,
    mut rx: mpsc::UnboundedReceiver<SessionCommand>,
    config: Arc<ServerConfig>,
    games: Registry,
) {
    let mut turns = interval(config.turn_interval);
    turns.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut supervise = interval(config.supervision_interval);
    supervise.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prestarted_at: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!(game = %session.id(), "all handles dropped");
                    break;
                };
                match cmd {
                    SessionCommand::AddClient { client, last_turn } => {
                        let outbound = client.outbound();
                        match session.add_client(client, last_turn, Instant::now()) {
                            Ok(()) => {}
                            // Spoofed rejoins get no answer.
                            Err(SessionError::IdentityMismatch(client_id)) => {
                                debug!(game = %session.id(), client = %client_id, "join ignored");
                            }
                            Err(e) => {
                                warn!(game = %session.id(), "rejected client: {}", e);
                                reject(&outbound, &e);
                            }
                        }
                    }
                    SessionCommand::Inbound { connection, text } => session.queue_inbound(connection, text),
                    SessionCommand::Disconnected(connection) => session.disconnect(connection, Instant::now()),
                    SessionCommand::Start => {
                        let was_started = session.has_started();
                        session.prestart();
                        session.start(Instant::now());
                        if !was_started {
                            turns.reset();
                        }
                    }
                    SessionCommand::Info(reply) => {
                        let _ = reply.send(session.game_info(Instant::now()));
                    }
                }
            }
            _ = turns.tick(), if session.has_started() => {
                session.end_turn(Instant::now());
            }
            _ = supervise.tick() => {
                let now = Instant::now();
                if !session.has_started() {
                    session.drain_inbound(now);
                }
                match session.phase(now) {
                    GamePhase::Finished => break,
                    GamePhase::Active if session.is_public() => {
                        match prestarted_at {
                            None => {
                                session.prestart();
                                prestarted_at = Some(now);
                            }
                            Some(at) if !session.has_started()
                                && now.saturating_duration_since(at) >= config.start_delay => {
                                session.start(now);
                                turns.reset();
                            }
                            Some(_) => {}
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    session.end();
    games.write().await.remove(session.id());
    info!(game = %session.id(), "game removed");
}

/// Tell a rejected client why, then close its connection.
fn reject(outbound: &mpsc::UnboundedSender<Outbound>, err: &SessionError) {
    match (ServerMessage::Error { message: err.to_string() }).to_json() {
        Ok(text) => {
            let _ = outbound.send(Outbound::Text(text));
        }
        Err(e) => debug!("failed to serialize error: {}", e),
    }
    let _ = outbound.send(Outbound::Close(err.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::GameType;
    use crate::network::archive::MemoryArchive;
    use crate::network::client::tests::test_client;
    use std::time::Duration;

    fn manager(config: ServerConfig) -> (GameManager, Arc<MemoryArchive>) {
        let archive = Arc::new(MemoryArchive::new());
        (GameManager::new(Arc::new(config), archive.clone()), archive)
    }

    fn fast_config() -> ServerConfig {
        ServerConfig {
            turn_interval: Duration::from_millis(10),
            supervision_interval: Duration::from_millis(10),
            ..ServerConfig::default()
        }
    }

    fn private() -> GameConfig {
        GameConfig { game_type: GameType::Private, ..GameConfig::default() }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (gm, _) = manager(fast_config());
        gm.create_game("g1".to_string(), private()).await.unwrap();
        assert!(matches!(
            gm.create_game("g1".to_string(), private()).await,
            Err(SessionError::GameExists(_))
        ));
        assert_eq!(gm.game_count().await, 1);
        let info = gm.game_info("g1").await.unwrap();
        assert_eq!(info.game_id, "g1");
        assert!(info.ms_until_start.is_none());
        assert!(matches!(gm.game_info("nope").await, Err(SessionError::GameNotFound(_))));
    }

    #[tokio::test]
    async fn test_private_game_streams_turns() {
        let (gm, _) = manager(fast_config());
        gm.create_game("g1".to_string(), private()).await.unwrap();
        let (client, mut rx) = test_client("c1", 1);
        gm.add_client("g1", client, 0).await.unwrap();
        gm.start_game("g1").await.unwrap();

        let mut kinds = Vec::new();
        while kinds.len() < 5 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
                Some(Outbound::Text(text)) => kinds.push(match ServerMessage::from_json(&text).unwrap() {
                    ServerMessage::Prestart { .. } => "prestart",
                    ServerMessage::Start { .. } => "start",
                    ServerMessage::Turn { .. } => "turn",
                    _ => "other",
                }),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(kinds, vec!["prestart", "start", "turn", "turn", "turn"]);
    }

    #[tokio::test]
    async fn test_public_game_cannot_be_started_by_hand() {
        let (gm, _) = manager(fast_config());
        let config = GameConfig { game_type: GameType::Public, ..GameConfig::default() };
        gm.create_game("pub".to_string(), config).await.unwrap();
        assert!(matches!(gm.start_game("pub").await, Err(SessionError::PublicGame(_))));
        assert_eq!(gm.public_game_ids().await, vec!["pub".to_string()]);
    }

    #[tokio::test]
    async fn test_finished_game_is_removed() {
        let config = ServerConfig {
            max_game_duration: Duration::from_millis(30),
            ..fast_config()
        };
        let (gm, _) = manager(config);
        let handle = gm.create_game("g1".to_string(), private()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gm.game_count().await, 0);
        assert!(handle.is_closed());
        let (client, _rx) = test_client("c1", 1);
        assert!(matches!(handle.add_client(client, 0), Err(SessionError::Closed(_))));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_sessions() {
        let (gm, archive) = manager(fast_config());
        let handle = gm.create_game("g1".to_string(), private()).await.unwrap();
        let (client, mut rx) = test_client("c1", 1);
        gm.add_client("g1", client, 0).await.unwrap();
        gm.start_game("g1").await.unwrap();

        assert_eq!(gm.shutdown().await, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_closed());
        assert_eq!(gm.game_count().await, 0);
        // Dropped, not ended: nothing archived and the client channel just closes.
        assert!(archive.records().is_empty());
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            assert!(!matches!(frame, Outbound::Close(_)), "unexpected {frame:?}");
        }
    }

    #[tokio::test]
    async fn test_spoofed_rejoin_gets_no_answer() {
        let (gm, _) = manager(fast_config());
        gm.create_game("g1".to_string(), private()).await.unwrap();
        let (first, _rx1) = test_client("c1", 1);
        gm.add_client("g1", first, 0).await.unwrap();
        let (mut imposter, mut rx2) = test_client("c1", 2);
        imposter.persistent_id = "wrong".to_string();
        gm.add_client("g1", imposter, 0).await.unwrap();

        // The imposter's channel closes without an error frame.
        let frame = tokio::time::timeout(Duration::from_secs(1), rx2.recv()).await.unwrap();
        assert!(frame.is_none(), "unexpected {frame:?}");
        let info = gm.game_info("g1").await.unwrap();
        assert_eq!(info.clients.len(), 1);
    }

    #[tokio::test]
    async fn test_ip_limited_client_is_told_why() {
        let (gm, _) = manager(fast_config());
        let config = GameConfig { game_type: GameType::Public, ..GameConfig::default() };
        gm.create_game("pub".to_string(), config).await.unwrap();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (client, rx) = test_client(id, 9);
            receivers.push(rx);
            gm.add_client("pub", client, 0).await.unwrap();
        }
        let (extra, mut rx) = test_client("d", 9);
        gm.add_client("pub", extra, 0).await.unwrap();

        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            Some(Outbound::Text(text)) => {
                assert!(matches!(ServerMessage::from_json(&text).unwrap(), ServerMessage::Error { .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
