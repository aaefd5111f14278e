//! Session management subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectRequest
//!     → new session (id, random password, negotiated timeout)
//!     | resume (id + password match, not expired)
//!     | rejected (zeroed ConnectResponse, connection closed)
//!
//! Every request → touch(id)
//! Expirer tick  → take_expired(now) → ephemerals removed → watches fire
//! closeSession  → remove(id)        → ephemerals removed → watches fire
//! ```
//!
//! # Design Decisions
//! - Sessions outlive connections: a dropped client can reconnect until the
//!   timeout passes
//! - Ephemeral ownership lives in the tree, not here, so the tree lock alone
//!   orders ephemeral cleanup against other writes

pub mod expirer;
pub mod manager;

pub use expirer::SessionExpirer;
pub use manager::{Session, SessionManager};
