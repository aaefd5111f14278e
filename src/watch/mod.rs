//! Watch subsystem.
//!
//! # Data Flow
//! ```text
//! getData/exists(watch=true)      → add(path, Data, conn)
//! getChildren(2)(watch=true)      → add(path, Child, conn)
//! create/delete/setData applied   → trigger(path, event) → conn queue
//! connection task                 → drains queue → xid -1 notification frame
//! ```
//!
//! # Design Decisions
//! - Watches are one-shot: triggering removes the registration
//! - Registration and triggering happen while the caller holds the tree lock,
//!   so a read-then-watch never misses a concurrent write
//! - Delivery uses unbounded per-connection queues; triggering never blocks

pub mod manager;

pub use manager::{EventSink, WatchKind, WatchManager};
