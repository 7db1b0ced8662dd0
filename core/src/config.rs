// Relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of the monitoring sink that receives a copy of every relay
pub const DEFAULT_MONITOR_CITY: &str = "Monitor_Admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Heartbeat period per session; 0 disables keepalive
    pub keepalive_interval_secs: u64,
    /// Upper bound on a single channel send; exceeding it is a transient failure
    pub send_timeout_ms: u64,
    /// Monitoring sink identity, copied on every relay and hidden from `active_cities`
    pub monitor_city: String,
    /// Concurrent codec jobs allowed off the async scheduler
    pub codec_workers: usize,
    /// Broadcast fire-and-forget `system` notices on join/relay/forward/delivery
    pub system_notices: bool,
    /// Outbound queue depth per gateway channel
    pub channel_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 20,
            send_timeout_ms: 1000,
            monitor_city: DEFAULT_MONITOR_CITY.to_string(),
            codec_workers: 4,
            system_notices: true,
            channel_buffer: 64,
        }
    }
}

impl RelayConfig {
    pub fn keepalive_interval(&self) -> Option<Duration> {
        match self.keepalive_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.monitor_city, "Monitor_Admin");
        assert_eq!(config.keepalive_interval(), Some(Duration::from_secs(20)));
        assert_eq!(config.send_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"keepalive_interval_secs":0,"codec_workers":8}"#).unwrap();
        assert_eq!(config.keepalive_interval(), None);
        assert_eq!(config.codec_workers, 8);
        assert!(config.system_notices);
    }
}
