//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → TestingServer::start → ruok probe → ready
//!     any error → stderr diagnostic → failure policy
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loop exits (port released) → connections drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → end of the serve phase
//! ```
//!
//! # Design Decisions
//! - Ordered startup: validate, bind, spawn background tasks, probe
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a timeout; stragglers are abandoned, not awaited forever

pub mod shutdown;
pub mod signals;
pub mod startup;
