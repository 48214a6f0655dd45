//! WebSocket Worker
//!
//! One listener per worker. The first frame on a connection must be a
//! `join` for a game hosted by this worker; every later frame is forwarded
//! untouched to that game's session task.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::network::client::{next_connection_id, Client, Outbound};
use crate::network::config::ServerConfig;
use crate::network::manager::GameManager;
use crate::network::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::network::session::SessionError;
use crate::network::shard::{worker_index, worker_port_by_index};

/// Worker errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Client sent something other than the expected message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session refused the request.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The game is hosted by another worker.
    #[error("game {game_id} belongs to worker {expected}, this is worker {actual}")]
    WrongWorker {
        /// Requested game.
        game_id: String,
        /// Worker that hosts it.
        expected: u32,
        /// This worker.
        actual: u32,
    },

    /// Connection closed before a join frame arrived.
    #[error("connection closed before join")]
    NoJoin,
}

/// A worker's WebSocket front.
#[derive(Debug)]
pub struct WorkerServer {
    worker_id: u32,
    config: Arc<ServerConfig>,
    games: GameManager,
}

struct JoinRequest {
    game_id: String,
    client: Client,
    last_turn: usize,
}

impl WorkerServer {
    /// Create the front for worker `worker_id`.
    pub fn new(worker_id: u32, config: Arc<ServerConfig>, games: GameManager) -> Self {
        Self { worker_id, config, games }
    }

    /// Games hosted by this worker.
    pub fn games(&self) -> &GameManager {
        &self.games
    }

    /// Bind this worker's port and serve.
    #[instrument(skip(self), fields(worker = self.worker_id))]
    pub async fn run(self) -> Result<(), ServerError> {
        let port = worker_port_by_index(&self.config, self.worker_id);
        let listener = TcpListener::bind((self.config.bind_host.as_str(), port)).await?;
        info!("worker {} listening on {}", self.worker_id, listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accept connections on `listener` forever.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let this = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("new connection from {}", addr);
                    let this = this.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_connection(stream, addr).await {
                            debug!("connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("accept error: {}", e),
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), ServerError> {
        let mut forwarded: Option<IpAddr> = None;
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok());
            Ok(resp)
        })
        .await?;
        let ip = forwarded.unwrap_or_else(|| addr.ip());

        let (mut sink, mut frames) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        // Writer task; ends on a close request or once every sender is gone.
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close(reason) => {
                        let close = CloseFrame { code: CloseCode::Normal, reason: reason.into() };
                        let _ = sink.send(Message::Close(Some(close))).await;
                        break;
                    }
                }
            }
        });

        let join = match self.read_join(&mut frames, ip, tx.clone()).await {
            Ok(join) => join,
            Err(e) => {
                warn!("rejecting connection from {}: {}", ip, e);
                reject(&tx, &e);
                return Err(e);
            }
        };
        let connection = join.client.connection;
        let Some(handle) = self.games.game(&join.game_id).await else {
            let e = ServerError::Session(SessionError::GameNotFound(join.game_id));
            info!("{} on worker {}", e, self.worker_id);
            reject(&tx, &e);
            return Err(e);
        };
        handle.add_client(join.client, join.last_turn)?;
        drop(tx);

        while let Some(msg) = frames.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if handle.inbound(connection, text).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => debug!("binary frame from {} ignored", ip),
                Ok(_) => {}
                Err(e) => {
                    debug!("websocket error for {}: {}", ip, e);
                    break;
                }
            }
        }
        if let Err(e) = handle.disconnected(connection) {
            debug!("disconnect of {} not delivered: {}", ip, e);
        }
        Ok(())
    }

    async fn read_join(
        &self,
        frames: &mut SplitStream<WebSocketStream<TcpStream>>,
        ip: IpAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Result<JoinRequest, ServerError> {
        let text = loop {
            match frames.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(Message::Close(_))) | None => return Err(ServerError::NoJoin),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        };

        match ClientMessage::from_json(&text)? {
            ClientMessage::Join { client_id, persistent_id, game_id, username, flag, last_turn } => {
                let expected = worker_index(&game_id, self.config.num_workers);
                if expected != self.worker_id {
                    return Err(ServerError::WrongWorker { game_id, expected, actual: self.worker_id });
                }
                let client = Client::new(
                    client_id,
                    persistent_id,
                    ip,
                    username,
                    flag,
                    next_connection_id(),
                    outbound,
                );
                Ok(JoinRequest { game_id, client, last_turn })
            }
            other => Err(ProtocolError::Unexpected { expected: "join", got: other.kind() }.into()),
        }
    }
}

fn reject(outbound: &mpsc::UnboundedSender<Outbound>, err: &ServerError) {
    if let Ok(text) = (ServerMessage::Error { message: err.to_string() }).to_json() {
        let _ = outbound.send(Outbound::Text(text));
    }
    let _ = outbound.send(Outbound::Close(err.to_string()));
}
