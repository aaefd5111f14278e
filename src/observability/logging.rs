//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Pick the pretty or JSON formatter from config
//! - Honor `ZKNODE_LOG` / `RUST_LOG` overrides
//!
//! # Design Decisions
//! - JSON format for machine parsing, pretty format for development
//! - Log level configurable via config and environment

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "ZKNODE_LOG";

/// Build the level filter: `ZKNODE_LOG`, then `RUST_LOG`, then the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| format!("zknode={}", config.log_level).into())
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed, which only happens when the
/// library is embedded in a process that set up its own.
pub fn init(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stdout))
            .try_init()
    }
}
