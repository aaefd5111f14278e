//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (identity, live-connection tracking)
//!     → Hand off to server::handler
//! ```
//!
//! # Design Decisions
//! - Bounded accept (semaphore) prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Dropping the listener is what releases the client port

pub mod connection;
pub mod listener;
