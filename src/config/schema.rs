//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the test server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the embedded coordination service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Identifier mixed into the high byte of every session id.
    pub server_id: u8,

    /// Listener configuration (bind host, port, connection limit).
    pub listener: ListenerConfig,

    /// Session timing.
    pub session: SessionConfig,

    /// Wire protocol limits.
    pub protocol: ProtocolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// What the bootstrap runner does when startup fails.
    pub startup: StartupConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: 1,
            listener: ListenerConfig::default(),
            session: SessionConfig::default(),
            protocol: ProtocolConfig::default(),
            observability: ObservabilityConfig::default(),
            startup: StartupConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Client port. 0 asks the OS for a free port.
    pub port: u16,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// The `host:port` string handed to the socket layer.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2181,
            max_connections: 60,
        }
    }
}

/// Session timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Basic time unit in milliseconds; the expiry sweep runs once per tick.
    pub tick_time_ms: u64,

    /// Lower bound for negotiated session timeouts. Defaults to 2 ticks.
    pub min_session_timeout_ms: Option<u64>,

    /// Upper bound for negotiated session timeouts. Defaults to 20 ticks.
    pub max_session_timeout_ms: Option<u64>,
}

impl SessionConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_time_ms)
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(
            self.min_session_timeout_ms
                .unwrap_or(self.tick_time_ms.saturating_mul(2)),
        )
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(
            self.max_session_timeout_ms
                .unwrap_or(self.tick_time_ms.saturating_mul(20)),
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_time_ms: 2000,
            min_session_timeout_ms: None,
            max_session_timeout_ms: None,
        }
    }
}

/// Wire protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: usize,

    /// Answer `ruok`, `srvr`, `mntr` and friends on the client port.
    pub four_letter_words: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            // jute.maxbuffer plus room for request headers
            max_frame_bytes: 0xfffff + 1024,
            four_letter_words: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9141".to_string(),
        }
    }
}

/// How the bootstrap runner reacts to a failed start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Print the diagnostic and exit normally.
    #[default]
    Log,
    /// Print the diagnostic and exit with a failure status.
    Fail,
}

/// Startup behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    pub failure_policy: FailurePolicy,

    /// How long to wait for the freshly bound server to answer `ruok`.
    pub ready_timeout_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Log,
            ready_timeout_ms: 5000,
        }
    }
}
