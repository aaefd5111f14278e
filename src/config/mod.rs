//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (port, host, failure policy)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults, so running without a file gives a standalone
//!   server on port 2181
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::FailurePolicy;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProtocolConfig;
pub use schema::ServerConfig;
pub use schema::SessionConfig;
pub use schema::StartupConfig;
pub use validation::{validate_config, ValidationError};
