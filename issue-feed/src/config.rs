//! Construction-time configuration for an [`IssueFeed`](crate::IssueFeed).

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
const DEFAULT_HEARTBEAT_MS: u64 = 10_000;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    pub endpoint: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl FeedConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.reconnect = ReconnectConfig {
            max_attempts: max_attempts.max(1),
            delay_ms: delay.as_millis() as u64,
        };
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat_ms = heartbeat.as_millis() as u64;
        self
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_heartbeat_ms() -> u64 {
    DEFAULT_HEARTBEAT_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::FeedConfig;
    use std::time::Duration;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: FeedConfig =
            serde_json::from_str(r#"{"endpoint":"ws://localhost:8080/ws"}"#).expect("valid config");

        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay(), Duration::from_millis(3000));
        assert_eq!(config.heartbeat(), Duration::from_secs(10));
        assert_eq!(config.channel_capacity(), 256);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<FeedConfig>(r#"{"endpoint":"ws://x","retries":3}"#);

        assert!(parsed.is_err());
    }

    #[test]
    fn with_reconnect_keeps_at_least_one_attempt() {
        let config = FeedConfig::new("ws://x").with_reconnect(0, Duration::from_millis(100));

        assert_eq!(config.reconnect.max_attempts, 1);
        assert_eq!(config.reconnect.delay_ms, 100);
    }
}
