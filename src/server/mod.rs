//! Embedded coordination server.
//!
//! # Data Flow
//! ```text
//! TestingServer::start
//!     → net::Listener (bind client port)
//!     → accept loop → handler.rs (one task per connection)
//!         → four-letter word? → admin.rs → reply, close
//!         → handshake → session loop
//!             → processor.rs (decode, apply to tree, fire watches, encode reply)
//!     → session::SessionExpirer (one task, ticks every tick_time)
//! ```
//!
//! # Design Decisions
//! - All shared state lives in one `ServerState` behind an `Arc`
//! - The tree lock is taken once per request and released before any I/O
//! - Lock order is tree, then watches; the session table is lock-free

pub mod admin;
pub mod handler;
pub mod processor;
pub mod testing_server;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;
use crate::session::SessionManager;
use crate::tree::DataTree;
use crate::watch::WatchManager;

pub use testing_server::{CloseError, TestingServer};

/// Everything the connection, expirer and accept tasks share.
#[derive(Debug)]
pub struct ServerState {
    pub config: ServerConfig,
    pub tree: Mutex<DataTree>,
    pub sessions: SessionManager,
    pub watches: WatchManager,
    pub connections: ConnectionTracker,
    pub started_at: Instant,
    pub packets_received: AtomicU64,
    pub packets_sent: AtomicU64,
}

/// Point-in-time counters reported by `srvr`, `mntr` and [`TestingServer::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub znode_count: usize,
    pub ephemeral_count: usize,
    pub watch_count: usize,
    pub session_count: usize,
    pub connection_count: u64,
    pub last_zxid: i64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub uptime: Duration,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let sessions = SessionManager::new(
            config.server_id,
            config.session.min_timeout(),
            config.session.max_timeout(),
        );
        Self {
            config,
            tree: Mutex::new(DataTree::new()),
            sessions,
            watches: WatchManager::new(),
            connections: ConnectionTracker::new(),
            started_at: Instant::now(),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
        }
    }

    /// Lock the tree. A panic in another request does not wedge the server.
    pub fn lock_tree(&self) -> MutexGuard<'_, DataTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete a finished session's ephemeral nodes and notify their watchers.
    pub fn drop_ephemerals(&self, tree: &mut DataTree, session_id: i64) -> Vec<String> {
        let removed = tree.remove_ephemerals(session_id);
        for path in &removed {
            self.watches.node_deleted(path);
        }
        removed
    }

    /// Publish tree and session gauges. Call with the tree lock held.
    pub fn publish_gauges(&self, tree: &DataTree) {
        metrics::record_tree(tree.node_count(), self.watches.count());
        metrics::set_active_sessions(self.sessions.len());
    }

    pub fn stats(&self) -> ServerStats {
        let (znode_count, ephemeral_count, last_zxid) = {
            let tree = self.lock_tree();
            (tree.node_count(), tree.ephemeral_count(), tree.last_zxid())
        };
        ServerStats {
            znode_count,
            ephemeral_count,
            watch_count: self.watches.count(),
            session_count: self.sessions.len(),
            connection_count: self.connections.active_count(),
            last_zxid,
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}
