//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (tick > 0, session bounds ordered, limits sane)
//! - Validate addresses parse before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for values the server cannot run with.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address().parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.host",
            format!("`{}` is not an IP address", config.listener.host),
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than 0",
        ));
    }

    if config.session.tick_time_ms == 0 {
        errors.push(ValidationError::new("session.tick_time_ms", "must be greater than 0"));
    }

    let min = config.session.min_timeout();
    let max = config.session.max_timeout();
    if min.is_zero() {
        errors.push(ValidationError::new(
            "session.min_session_timeout_ms",
            "must be greater than 0",
        ));
    }
    // negotiated timeouts travel as i32 milliseconds
    for (field, bound) in [
        ("session.min_session_timeout_ms", min),
        ("session.max_session_timeout_ms", max),
    ] {
        if bound.as_millis() > i32::MAX as u128 {
            errors.push(ValidationError::new(
                field,
                format!("must not exceed {} ms", i32::MAX),
            ));
        }
    }
    if min > max {
        errors.push(ValidationError::new(
            "session.max_session_timeout_ms",
            format!(
                "maximum ({} ms) is below minimum ({} ms)",
                max.as_millis(),
                min.as_millis()
            ),
        ));
    }

    if config.protocol.max_frame_bytes < 1024 {
        errors.push(ValidationError::new(
            "protocol.max_frame_bytes",
            "must be at least 1024",
        ));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format `{}`", config.observability.log_format),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
