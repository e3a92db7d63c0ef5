use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Collaboration timing and buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Quiet period before a cursor move is broadcast
    pub debounce: Duration,
    /// Peers silent for longer than this are dropped from presence
    pub presence_timeout: Duration,
    /// Capacity of the broker's broadcast channel
    pub channel_capacity: usize,
    /// How many of the newest messages keep their structural effects and
    /// ids, for commands and late joiners still based on them
    pub retained_messages: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            presence_timeout: Duration::from_secs(30),
            channel_capacity: 1024,
            retained_messages: 1024,
        }
    }
}

impl CollabConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let debounce = match env::var("CELLSYNC_DEBOUNCE_MS") {
            Ok(ms) => Duration::from_millis(ms.parse()?),
            Err(_) => defaults.debounce,
        };
        let presence_timeout = match env::var("CELLSYNC_PRESENCE_TIMEOUT_SECS") {
            Ok(secs) => Duration::from_secs(secs.parse()?),
            Err(_) => defaults.presence_timeout,
        };
        let channel_capacity = match env::var("CELLSYNC_CHANNEL_CAPACITY") {
            Ok(capacity) => capacity.parse()?,
            Err(_) => defaults.channel_capacity,
        };
        if channel_capacity == 0 {
            anyhow::bail!("CELLSYNC_CHANNEL_CAPACITY must be positive");
        }
        let retained_messages = match env::var("CELLSYNC_RETAINED_MESSAGES") {
            Ok(count) => count.parse()?,
            Err(_) => defaults.retained_messages,
        };

        Ok(Self {
            debounce,
            presence_timeout,
            channel_capacity,
            retained_messages,
        })
    }

    /// How often an idle client repeats its presence so peers keep it
    pub fn keepalive(&self) -> Duration {
        self.presence_timeout / 2
    }
}
