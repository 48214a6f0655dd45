//! Worker Sharding
//!
//! Games are spread over a fixed set of workers by a hash of the game id.
//! Every worker is a supervised task with its own listener; a worker that
//! fails or panics is respawned under the same index with an empty
//! [`GameManager`]. Session tasks of the failed worker are aborted.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::game::config::{GameConfig, GameType};
use crate::network::archive::Archive;
use crate::network::config::ServerConfig;
use crate::network::manager::GameManager;
use crate::network::server::{ServerError, WorkerServer};

/// 31-multiplier string hash over UTF-16 code units with `i32` wrapping,
/// returned as its absolute value.
pub fn simple_hash(s: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}

/// Worker that hosts `game_id`.
pub fn worker_index(game_id: &str, num_workers: u32) -> u32 {
    simple_hash(game_id) % num_workers.max(1)
}

/// Port of the worker that hosts `game_id`.
pub fn worker_port(config: &ServerConfig, game_id: &str) -> u16 {
    worker_port_by_index(config, worker_index(game_id, config.num_workers))
}

/// Port of worker `index`.
pub fn worker_port_by_index(config: &ServerConfig, index: u32) -> u16 {
    config.base_port.saturating_add(index as u16)
}

/// Fresh 8-character game id.
pub fn generate_game_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Run the worker produced by `spawn` until it exits cleanly, respawning
/// it under the same index after every failure or panic.
pub async fn supervise<F, Fut>(index: u32, respawn_delay: Duration, mut spawn: F)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
{
    loop {
        match tokio::spawn(spawn(index)).await {
            Ok(Ok(())) => {
                info!(worker = index, "worker exited");
                return;
            }
            Ok(Err(e)) => error!(worker = index, "worker failed: {}", e),
            Err(e) => error!(worker = index, "worker crashed: {}", e),
        }
        sleep(respawn_delay).await;
        warn!(worker = index, "respawning worker");
    }
}

/// Owns every worker of this process.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<ServerConfig>,
    archive: Arc<dyn Archive>,
    managers: Arc<RwLock<Vec<GameManager>>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").field("config", &self.config).finish()
    }
}

impl Supervisor {
    /// One empty manager per worker.
    pub fn new(config: Arc<ServerConfig>, archive: Arc<dyn Archive>) -> Self {
        let managers = (0..config.num_workers)
            .map(|_| GameManager::new(config.clone(), archive.clone()))
            .collect();
        Self { config, archive, managers: Arc::new(RwLock::new(managers)) }
    }

    /// Current manager of the worker hosting `game_id`.
    pub async fn manager_for(&self, game_id: &str) -> Option<GameManager> {
        let index = worker_index(game_id, self.config.num_workers) as usize;
        self.managers.read().await.get(index).cloned()
    }

    /// Start every worker and the public lobby schedule. Returns once every
    /// worker has exited cleanly.
    pub async fn run(self) {
        info!(workers = self.config.num_workers, base_port = self.config.base_port, "starting workers");
        let scheduler = tokio::spawn(self.clone().schedule_public_games());
        let workers = (0..self.config.num_workers).map(|index| {
            let this = self.clone();
            let mut attempts = 0u32;
            supervise(index, self.config.respawn_delay, move |index| {
                let this = this.clone();
                let respawn = attempts > 0;
                attempts += 1;
                async move { this.start_worker(index, respawn).await }
            })
        });
        join_all(workers).await;
        scheduler.abort();
    }

    async fn start_worker(&self, index: u32, respawn: bool) -> Result<(), ServerError> {
        let manager = if respawn {
            self.replace_manager(index).await
        } else {
            match self.managers.read().await.get(index as usize) {
                Some(manager) => manager.clone(),
                None => GameManager::new(self.config.clone(), self.archive.clone()),
            }
        };
        WorkerServer::new(index, self.config.clone(), manager).run().await
    }

    /// Install an empty manager for worker `index`, aborting the sessions of
    /// the one it replaces.
    async fn replace_manager(&self, index: u32) -> GameManager {
        let fresh = GameManager::new(self.config.clone(), self.archive.clone());
        let old = self
            .managers
            .write()
            .await
            .get_mut(index as usize)
            .map(|slot| std::mem::replace(slot, fresh.clone()));
        if let Some(old) = old {
            let lost = old.shutdown().await;
            if lost > 0 {
                warn!(worker = index, games = lost, "sessions lost with failed worker");
            }
        }
        fresh
    }

    /// Keep one public lobby open, creating a new one every creation period.
    async fn schedule_public_games(self) {
        let mut ticker = interval(self.config.game_creation_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let id = generate_game_id();
            let Some(manager) = self.manager_for(&id).await else {
                continue;
            };
            let config = GameConfig { game_type: GameType::Public, ..GameConfig::default() };
            match manager.create_game(id.clone(), config).await {
                Ok(_) => info!(game = %id, worker = worker_index(&id, self.config.num_workers), "public lobby scheduled"),
                Err(e) => warn!(game = %id, "failed to schedule public lobby: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_simple_hash_values() {
        assert_eq!(simple_hash(""), 0);
        assert_eq!(simple_hash("a"), 97);
        assert_eq!(simple_hash("ab"), 3105);
        // Wraps through i32.
        assert_eq!(simple_hash("game-1234"), 952_927_549);
        assert_eq!(simple_hash("xK3p9QzW"), 1_907_557_115);
    }

    #[test]
    fn test_worker_routing() {
        let config = ServerConfig { num_workers: 3, base_port: 4000, ..ServerConfig::default() };
        assert_eq!(worker_index("xK3p9QzW", 3), 2);
        assert_eq!(worker_port(&config, "xK3p9QzW"), 4002);
        assert_eq!(worker_index("ab", 3), 0);
        assert_eq!(worker_index("anything", 1), 0);
    }

    #[test]
    fn test_generated_ids() {
        let a = generate_game_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, generate_game_id());
    }

    #[tokio::test]
    async fn test_crashed_worker_respawns_with_same_index() {
        let starts = Arc::new(AtomicU32::new(0));
        let counter = starts.clone();
        supervise(7, Duration::from_millis(1), move |index| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(index, 7);
                match attempt {
                    0 => panic!("worker blew up"),
                    1 => Err(ServerError::NoJoin),
                    _ => Ok(()),
                }
            }
        })
        .await;
        assert_eq!(starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_respawn_drops_old_sessions() {
        let config = Arc::new(ServerConfig { num_workers: 2, ..ServerConfig::default() });
        let supervisor = Supervisor::new(config, Arc::new(crate::network::archive::MemoryArchive::new()));
        let manager = supervisor.manager_for("ab").await.unwrap();
        let handle = manager.create_game("ab".to_string(), GameConfig::default()).await.unwrap();

        let fresh = supervisor.replace_manager(worker_index("ab", 2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_closed());
        assert_eq!(manager.game_count().await, 0);
        assert_eq!(fresh.game_count().await, 0);
        assert!(supervisor.manager_for("ab").await.unwrap().game("ab").await.is_none());
    }

    #[tokio::test]
    async fn test_manager_for_routes_by_hash() {
        let config = Arc::new(ServerConfig { num_workers: 2, ..ServerConfig::default() });
        let supervisor = Supervisor::new(config, Arc::new(crate::network::archive::MemoryArchive::new()));
        let manager = supervisor.manager_for("ab").await.unwrap();
        manager.create_game("ab".to_string(), GameConfig::default()).await.unwrap();
        let again = supervisor.manager_for("ab").await.unwrap();
        assert!(again.game("ab").await.is_some());
        let other = supervisor.manager_for("").await.unwrap();
        assert!(other.game("ab").await.is_none());
    }
}
