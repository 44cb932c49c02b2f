//! Client configuration.

use std::time::Duration;

use crate::store::Layout;
use crate::tournament::code::DEFAULT_CODE_LENGTH;
use crate::tournament::round::ForfeitPolicy;

/// Tournament client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Collection root for every document path.
    pub root: String,
    /// Characters in generated game codes.
    pub code_length: usize,
    /// Fresh codes to try before giving up on a collision.
    pub max_code_attempts: u32,
    /// Lobby capacity.
    pub max_players: usize,
    /// Players required to start.
    pub min_players: usize,
    /// Read-derive-write attempts per action under contention.
    pub write_attempts: u32,
    /// Attempts per store call on transient failures.
    pub retry_attempts: u32,
    /// Initial backoff between transient retries.
    pub retry_backoff: Duration,
    /// What happens to a leaving player's unfinished match.
    pub forfeit_policy: ForfeitPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root: "rps".to_string(),
            code_length: DEFAULT_CODE_LENGTH,
            max_code_attempts: 8,
            max_players: 64,
            min_players: 2,
            write_attempts: 16,
            retry_attempts: 4,
            retry_backoff: Duration::from_millis(50),
            forfeit_policy: ForfeitPolicy::Stall,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("RPS_ROOT").unwrap_or(defaults.root),
            code_length: env_parse("RPS_CODE_LENGTH").unwrap_or(defaults.code_length),
            max_players: env_parse("RPS_MAX_PLAYERS").unwrap_or(defaults.max_players),
            write_attempts: env_parse("RPS_WRITE_ATTEMPTS").unwrap_or(defaults.write_attempts),
            retry_backoff: env_parse("RPS_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            forfeit_policy: match std::env::var("RPS_FORFEIT_ON_LEAVE") {
                Ok(v) if v == "true" || v == "1" => ForfeitPolicy::AutoForfeit,
                _ => defaults.forfeit_policy,
            },
            ..defaults
        }
    }

    /// Document layout under `root`.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
