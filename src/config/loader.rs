//! Reads the optional TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid TOML", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{} failed validation: {}", .path.display(), summarize(.errors))]
    Validation {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },
}

fn summarize(errors: &[ValidationError]) -> String {
    let fields: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    fields.join(", ")
}

/// Parse `path` and check it. Fields missing from the file keep their defaults.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: ServerConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if let Err(errors) = validate_config(&config) {
        return Err(ConfigError::Validation {
            path: path.to_path_buf(),
            errors,
        });
    }

    tracing::debug!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}
