//! Relay Configuration
//!
//! Timings and sharding parameters for the turn relay. Defaults match the
//! production deployment; `from_env` overrides the deployment-specific ones.

use std::time::Duration;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value {value:?} for {var}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host every worker binds on.
    pub bind_host: String,
    /// Port of worker 0; worker `i` listens on `base_port + i`.
    pub base_port: u16,
    /// Number of worker shards.
    pub num_workers: u32,
    /// Interval between turns once a game has started.
    pub turn_interval: Duration,
    /// A client silent for longer than this is disconnected.
    pub ping_timeout: Duration,
    /// Hard cap on a game's lifetime.
    pub max_game_duration: Duration,
    /// A started game with no clients ends after this long without pings.
    pub quiet_period: Duration,
    /// How long a public lobby stays open, and how often one is created.
    pub game_creation_rate: Duration,
    /// Extra time after the lobby closes before an empty public game ends.
    pub public_warmup: Duration,
    /// Delay between prestart and start of a public game.
    pub start_delay: Duration,
    /// Period of the per-session lifecycle check.
    pub supervision_interval: Duration,
    /// Active clients allowed per IP in public games.
    pub max_clients_per_ip: usize,
    /// Delay before a crashed worker is respawned.
    pub respawn_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            base_port: 3001,
            num_workers: 2,
            turn_interval: Duration::from_millis(100),
            ping_timeout: Duration::from_secs(60),
            max_game_duration: Duration::from_secs(3 * 60 * 60),
            quiet_period: Duration::from_secs(20),
            game_creation_rate: Duration::from_secs(60),
            public_warmup: Duration::from_secs(30),
            start_delay: Duration::from_secs(2),
            supervision_interval: Duration::from_secs(1),
            max_clients_per_ip: 3,
            respawn_delay: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `WARFRONT_BIND_HOST`, `WARFRONT_BASE_PORT`,
    /// `WARFRONT_NUM_WORKERS`, `WARFRONT_TURN_INTERVAL_MS` and
    /// `WARFRONT_GAME_CREATION_RATE_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = lookup("WARFRONT_BIND_HOST") {
            config.bind_host = host;
        }
        if let Some(port) = parse(&lookup, "WARFRONT_BASE_PORT")? {
            config.base_port = port;
        }
        if let Some(workers) = parse::<u32>(&lookup, "WARFRONT_NUM_WORKERS")? {
            if workers == 0 {
                return Err(ConfigError::Invalid { var: "WARFRONT_NUM_WORKERS", value: "0".to_string() });
            }
            config.num_workers = workers;
        }
        if let Some(ms) = parse(&lookup, "WARFRONT_TURN_INTERVAL_MS")? {
            config.turn_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "WARFRONT_GAME_CREATION_RATE_MS")? {
            config.game_creation_rate = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
