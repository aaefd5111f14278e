//! Client connection bookkeeping.
//!
//! Every accepted socket gets a [`ConnectionId`]. Watches are registered
//! against it, so ids are never reused within a process. The live count feeds
//! `srvr`, `mntr`, the `zk_connections_active` gauge and the shutdown drain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Shared live-connection counter.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(live);
        ConnectionGuard {
            id: ConnectionId::next(),
            live: Arc::clone(&self.live),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait for every guard to drop, giving up after `deadline`.
    ///
    /// Returns true when the count reached zero.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.live.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Held by a connection task for as long as the socket is open.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    live: Arc<AtomicU64>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(live);
    }
}
