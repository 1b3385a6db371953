//! Tunables for the tail loop and the settings file read by the CLI.

use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_MISSING_RETRY_LIMIT: u32 = 8;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Settings for one watched file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How often the file is re-checked when no filesystem event arrives.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Consecutive poll ticks with the file absent before it is reported missing.
    pub missing_retry_limit: u32,

    /// Capacity of the channel between the tail task and its consumer.
    pub channel_capacity: usize,

    /// Capacity of each `Monitor::subscribe` stream.
    pub delivery_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            missing_retry_limit: DEFAULT_MISSING_RETRY_LIMIT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            delivery_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WatchConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_missing_retry_limit(mut self, limit: u32) -> Self {
        self.missing_retry_limit = limit;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity;
        self
    }
}

/// Contents of a `chatcop.toml` settings file.
///
/// ```toml
/// log_file = "C:/Games/Client.txt"
/// filters = ["wtb", "divine"]
///
/// [watch]
/// poll_interval_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_file: Option<PathBuf>,
    pub filters: Vec<String>,
    pub watch: WatchConfig,
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
