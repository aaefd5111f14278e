//! zknode: a standalone, in-memory coordination server for tests.
//!
//! Speaks the client wire protocol of a single-node ZooKeeper ensemble
//! (sessions, znodes, ephemeral and sequential nodes, one-shot watches and
//! four-letter admin words) without persistence or replication.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let server = zknode::TestingServer::start(zknode::ServerConfig::default()).await?;
//! println!("connect to {}", server.connect_string());
//! server.close().await?;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod protocol;
pub mod server;

// State
pub mod session;
pub mod tree;
pub mod watch;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use lifecycle::shutdown::Shutdown;
pub use lifecycle::startup::StartupError;
pub use server::{CloseError, ServerStats, TestingServer};
