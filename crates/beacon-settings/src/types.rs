//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`
//! so a settings file only needs the keys it changes.

use std::time::Duration;

use beacon_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Upper bound accepted for `maxConnections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 1_000_000;

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Fanout behavior.
    pub fanout: FanoutSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl BeaconSettings {
    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be positive".into(),
            ));
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeatTimeoutMs ({}) must be >= heartbeatIntervalMs ({})",
                s.heartbeat_timeout_ms, s.heartbeat_interval_ms
            )));
        }
        if s.max_connections == 0 || s.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(SettingsError::InvalidValue(format!(
                "maxConnections must be between 1 and {MAX_CONNECTIONS_LIMIT}"
            )));
        }
        if s.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (HTTP and WebSocket share it).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue length.
    pub send_queue_capacity: usize,
    /// Lifetime queue overflows after which a slow client is evicted.
    pub max_dropped_messages: u64,
    /// Grace period for in-flight sessions on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerSettings {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Shutdown grace period as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            max_connections: 10_000,
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            max_dropped_messages: 100,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Who receives a `locationUpdate` when a vehicle with subscribers publishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishScope {
    /// Every connected client, subscribed or not.
    #[default]
    AllConnections,
    /// Only the vehicle's current subscribers.
    Subscribers,
}

impl PublishScope {
    /// Parse the env/CLI spelling (`allConnections`, `all`, `subscribers`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "allconnections" | "all_connections" | "all" => Some(Self::AllConnections),
            "subscribers" | "subscriber" => Some(Self::Subscribers),
            _ => None,
        }
    }

    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllConnections => "all_connections",
            Self::Subscribers => "subscribers",
        }
    }
}

/// Fanout engine settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FanoutSettings {
    /// Broadcast target for published positions.
    pub publish_scope: PublishScope,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` overrides it).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_snapshot() {
        insta::assert_json_snapshot!(BeaconSettings::default(), @r#"
        {
          "server": {
            "host": "0.0.0.0",
            "port": 3001,
            "maxConnections": 10000,
            "heartbeatIntervalMs": 25000,
            "heartbeatTimeoutMs": 60000,
            "maxMessageSize": 65536,
            "sendQueueCapacity": 256,
            "maxDroppedMessages": 100,
            "shutdownTimeoutMs": 10000
          },
          "fanout": {
            "publishScope": "allConnections"
          },
          "logging": {
            "level": "info",
            "format": "compact"
          }
        }
        "#);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: BeaconSettings =
            serde_json::from_str(r#"{"server":{"port":4000}}"#).unwrap();
        assert_eq!(s.server.port, 4000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.fanout.publish_scope, PublishScope::AllConnections);
    }

    #[test]
    fn publish_scope_parse() {
        assert_eq!(PublishScope::parse("allConnections"), Some(PublishScope::AllConnections));
        assert_eq!(PublishScope::parse("ALL"), Some(PublishScope::AllConnections));
        assert_eq!(PublishScope::parse("subscribers"), Some(PublishScope::Subscribers));
        assert_eq!(PublishScope::parse("nobody"), None);
    }

    #[test]
    fn default_settings_validate() {
        assert!(BeaconSettings::default().validate().is_ok());
    }

    #[test]
    fn timeout_below_interval_is_invalid() {
        let mut s = BeaconSettings::default();
        s.server.heartbeat_timeout_ms = 1_000;
        s.server.heartbeat_interval_ms = 5_000;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeatTimeoutMs"));
    }

    #[test]
    fn zero_queue_is_invalid() {
        let mut s = BeaconSettings::default();
        s.server.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn connection_cap_must_be_bounded() {
        let mut s = BeaconSettings::default();
        s.server.max_connections = 0;
        assert!(s.validate().is_err());
        s.server.max_connections = MAX_CONNECTIONS_LIMIT + 1;
        assert!(s.validate().is_err());
        s.server.max_connections = MAX_CONNECTIONS_LIMIT;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn durations() {
        let s = ServerSettings::default();
        assert_eq!(s.heartbeat_interval(), Duration::from_secs(25));
        assert_eq!(s.heartbeat_timeout(), Duration::from_secs(60));
        assert_eq!(s.shutdown_timeout(), Duration::from_secs(10));
    }
}
