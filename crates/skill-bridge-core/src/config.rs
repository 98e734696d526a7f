//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Handshake path the coordination server accepts sessions on.
pub const HANDSHAKE_PATH: &str = "/node-red/connect";

/// Options recognised by a session.
///
/// Every field has a default so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connect automatically. When `false`, `open` is a no-op.
    pub connect: bool,
    /// Coordination server host.
    pub host: String,
    /// Coordination server port.
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    pub use_tls: bool,
    /// Verify the server certificate and hostname.
    ///
    /// Turning this off accepts any certificate the server presents.
    pub verify_tls: bool,
    /// Path of the WebSocket handshake.
    pub handshake_path: String,
    /// Host runtime version reported in the auth request.
    pub runtime_version: Option<String>,
    /// Delay before re-sending a rejected auth request.
    pub auth_retry_ms: u64,
    /// Upper bound on a single connection attempt, handshake included.
    pub connect_timeout_ms: u64,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Inbound timestamp freshness.
    pub clock_skew: ClockSkewConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect: true,
            host: "localhost".to_string(),
            port: 443,
            use_tls: true,
            verify_tls: true,
            handshake_path: HANDSHAKE_PATH.to_string(),
            runtime_version: None,
            auth_retry_ms: 30_000,
            connect_timeout_ms: 30_000,
            backoff: BackoffConfig::default(),
            clock_skew: ClockSkewConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Endpoint derived from host, port and TLS options.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            path: self.handshake_path.clone(),
            use_tls: self.use_tls,
            verify_tls: self.verify_tls,
        }
    }

    /// Auth retry delay.
    #[must_use]
    pub const fn auth_retry(&self) -> Duration {
        Duration::from_millis(self.auth_retry_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Linear backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_ms: u64,
    pub max_ms: u64,
    pub step_ms: u64,
    /// Jitter ratio in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_ms: 2000,
            max_ms: 6000,
            step_ms: 250,
            jitter: 0.8,
        }
    }
}

/// How the freshness window of an inbound timestamp is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSkewPolicy {
    /// Timestamp must lie within the tolerance of the receiver's clock.
    #[default]
    ReceiverClock,
    /// Window is anchored on the timestamp itself, so only unparseable
    /// timestamps fail. Matches servers deployed against older clients.
    ParseOnly,
}

/// Inbound timestamp freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSkewConfig {
    pub policy: ClockSkewPolicy,
    pub tolerance_ms: u64,
}

impl Default for ClockSkewConfig {
    fn default() -> Self {
        Self {
            policy: ClockSkewPolicy::ReceiverClock,
            tolerance_ms: 10 * 60 * 1000,
        }
    }
}

impl ClockSkewConfig {
    /// Allowed distance from the reference instant.
    #[must_use]
    pub const fn tolerance(&self) -> Duration {
        Duration::from_millis(self.tolerance_ms)
    }
}

/// Where and how to open the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub use_tls: bool,
    pub verify_tls: bool,
}

impl Endpoint {
    /// WebSocket URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = SessionConfig::default();
        assert!(config.connect);
        assert_eq!(config.auth_retry(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.backoff.min_ms, 2000);
        assert_eq!(config.backoff.max_ms, 6000);
        assert_eq!(config.backoff.step_ms, 250);
        assert!((config.backoff.jitter - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.clock_skew.tolerance(), Duration::from_secs(600));
    }

    #[test]
    fn test_endpoint_url() {
        let mut config = SessionConfig {
            host: "bridge.example.com".to_string(),
            port: 8443,
            ..SessionConfig::default()
        };
        assert_eq!(
            config.endpoint().url(),
            "wss://bridge.example.com:8443/node-red/connect"
        );

        config.use_tls = false;
        assert_eq!(
            config.endpoint().url(),
            "ws://bridge.example.com:8443/node-red/connect"
        );
    }

    #[test]
    fn test_partial_config_deserialization() {
        let json = r#"{"host":"10.0.0.5","port":9000,"clock_skew":{"policy":"parse_only"}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9000);
        assert!(config.verify_tls);
        assert_eq!(config.clock_skew.policy, ClockSkewPolicy::ParseOnly);
        assert_eq!(config.clock_skew.tolerance_ms, 600_000);
    }
}
