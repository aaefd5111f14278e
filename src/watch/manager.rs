//! Watch registrations and event fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::net::connection::ConnectionId;
use crate::protocol::{EventType, WatcherEvent};
use crate::tree::path;

/// Which registration table a watch lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Set by `getData` and `exists`.
    Data,
    /// Set by `getChildren` and `getChildren2`.
    Child,
}

/// Sender half of a connection's notification queue.
pub type EventSink = mpsc::UnboundedSender<WatcherEvent>;

#[derive(Debug, Default)]
struct WatchTable {
    data: HashMap<String, HashSet<ConnectionId>>,
    child: HashMap<String, HashSet<ConnectionId>>,
    sinks: HashMap<ConnectionId, EventSink>,
}

impl WatchTable {
    fn table(&mut self, kind: WatchKind) -> &mut HashMap<String, HashSet<ConnectionId>> {
        match kind {
            WatchKind::Data => &mut self.data,
            WatchKind::Child => &mut self.child,
        }
    }
}

/// One-shot watches keyed by path, delivered to the owning connection.
#[derive(Debug, Default)]
pub struct WatchManager {
    inner: Mutex<WatchTable>,
}

impl WatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WatchTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection's notification queue.
    pub fn attach(&self, conn: ConnectionId, sink: EventSink) {
        self.lock().sinks.insert(conn, sink);
    }

    /// Drop a connection's queue and every watch it holds.
    pub fn detach(&self, conn: ConnectionId) {
        let mut guard = self.lock();
        let table = &mut *guard;
        table.sinks.remove(&conn);
        for map in [&mut table.data, &mut table.child] {
            map.retain(|_, watchers| {
                watchers.remove(&conn);
                !watchers.is_empty()
            });
        }
    }

    pub fn add(&self, path: &str, kind: WatchKind, conn: ConnectionId) {
        self.lock()
            .table(kind)
            .entry(path.to_string())
            .or_default()
            .insert(conn);
    }

    /// Fire and clear the watches an event type consumes on `path`.
    ///
    /// Returns the number of connections notified.
    pub fn trigger(&self, path: &str, event_type: EventType) -> usize {
        let kinds: &[WatchKind] = match event_type {
            EventType::NodeCreated | EventType::NodeDataChanged => &[WatchKind::Data],
            EventType::NodeChildrenChanged => &[WatchKind::Child],
            EventType::NodeDeleted => &[WatchKind::Data, WatchKind::Child],
        };

        let mut table = self.lock();
        let mut targets = HashSet::new();
        for kind in kinds {
            if let Some(watchers) = table.table(*kind).remove(path) {
                targets.extend(watchers);
            }
        }

        let mut delivered = 0;
        for conn in targets {
            if let Some(sink) = table.sinks.get(&conn) {
                if sink.send(WatcherEvent::new(event_type, path)).is_ok() {
                    delivered += 1;
                }
            }
        }
        if delivered > 0 {
            tracing::trace!(path, ?event_type, delivered, "Watches triggered");
        }
        delivered
    }

    /// Events for a newly created node.
    pub fn node_created(&self, node_path: &str) {
        self.trigger(node_path, EventType::NodeCreated);
        self.trigger(path::parent(node_path), EventType::NodeChildrenChanged);
    }

    /// Events for a deleted node.
    pub fn node_deleted(&self, node_path: &str) {
        self.trigger(node_path, EventType::NodeDeleted);
        self.trigger(path::parent(node_path), EventType::NodeChildrenChanged);
    }

    /// Deliver an event to one connection without touching registrations.
    pub fn notify(&self, conn: ConnectionId, event: WatcherEvent) -> bool {
        match self.lock().sinks.get(&conn) {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Total registrations across both tables.
    pub fn count(&self) -> usize {
        let table = self.lock();
        table.data.values().map(HashSet::len).sum::<usize>()
            + table.child.values().map(HashSet::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached(manager: &WatchManager) -> (ConnectionId, mpsc::UnboundedReceiver<WatcherEvent>) {
        let conn = ConnectionId::next();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.attach(conn, tx);
        (conn, rx)
    }

    #[test]
    fn data_watch_fires_once() {
        let watches = WatchManager::new();
        let (conn, mut rx) = attached(&watches);
        watches.add("/a", WatchKind::Data, conn);

        assert_eq!(watches.trigger("/a", EventType::NodeDataChanged), 1);
        assert_eq!(watches.trigger("/a", EventType::NodeDataChanged), 0);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::NodeDataChanged);
        assert_eq!(event.path, "/a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn child_watch_ignores_data_events() {
        let watches = WatchManager::new();
        let (conn, _rx) = attached(&watches);
        watches.add("/a", WatchKind::Child, conn);

        assert_eq!(watches.trigger("/a", EventType::NodeDataChanged), 0);
        assert_eq!(watches.count(), 1);
        assert_eq!(watches.trigger("/a", EventType::NodeChildrenChanged), 1);
        assert_eq!(watches.count(), 0);
    }

    #[test]
    fn delete_fires_both_tables_once_per_connection() {
        let watches = WatchManager::new();
        let (conn, mut rx) = attached(&watches);
        watches.add("/a", WatchKind::Data, conn);
        watches.add("/a", WatchKind::Child, conn);

        assert_eq!(watches.trigger("/a", EventType::NodeDeleted), 1);
        assert_eq!(rx.try_recv().unwrap().event_type, EventType::NodeDeleted);
        assert!(rx.try_recv().is_err());
        assert_eq!(watches.count(), 0);
    }

    #[test]
    fn node_created_notifies_parent_child_watchers() {
        let watches = WatchManager::new();
        let (conn, mut rx) = attached(&watches);
        watches.add("/parent", WatchKind::Child, conn);
        watches.add("/parent/kid", WatchKind::Data, conn);

        watches.node_created("/parent/kid");

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event_type, EventType::NodeCreated);
        assert_eq!(second.event_type, EventType::NodeChildrenChanged);
        assert_eq!(second.path, "/parent");
    }

    #[test]
    fn detach_drops_registrations() {
        let watches = WatchManager::new();
        let (a, _rx_a) = attached(&watches);
        let (b, mut rx_b) = attached(&watches);
        watches.add("/x", WatchKind::Data, a);
        watches.add("/x", WatchKind::Data, b);

        watches.detach(a);
        assert_eq!(watches.count(), 1);
        assert_eq!(watches.trigger("/x", EventType::NodeDeleted), 1);
        assert!(rx_b.try_recv().is_ok());
        assert!(!watches.notify(a, WatcherEvent::new(EventType::NodeCreated, "/x")));
    }
}
