//! Background session expiry.
//!
//! # Responsibilities
//! - Wake once per tick
//! - Expire sessions that have been silent longer than their timeout
//! - Delete their ephemeral nodes and fire the resulting watches

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::server::ServerState;

pub struct SessionExpirer {
    state: Arc<ServerState>,
    tick: Duration,
}

impl SessionExpirer {
    pub fn new(state: Arc<ServerState>) -> Self {
        let tick = state.config.session.tick();
        Self { state, tick }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(tick_ms = self.tick.as_millis() as u64, "Session expirer starting");

        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.expire(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Session expirer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Expire every session idle as of `now`. Returns how many were expired.
    pub fn expire(&self, now: Instant) -> usize {
        let expired = self.state.sessions.take_expired(now);
        if expired.is_empty() {
            return 0;
        }

        let mut tree = self.state.lock_tree();
        for session in &expired {
            let removed = self.state.drop_ephemerals(&mut tree, session.id);
            tracing::info!(
                session_id = %format!("0x{:x}", session.id),
                timeout_ms = session.timeout.as_millis() as u64,
                ephemerals = removed.len(),
                "Session expired"
            );
        }
        self.state.publish_gauges(&tree);
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::{Acl, CreateMode};
    use bytes::Bytes;

    #[test]
    fn expiry_removes_ephemerals() {
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let session = state.sessions.create(4000);
        state
            .lock_tree()
            .create("/lock", Bytes::new(), Acl::open_unsafe(), CreateMode::Ephemeral, session.id)
            .unwrap();

        let expirer = SessionExpirer::new(Arc::clone(&state));
        assert_eq!(expirer.expire(Instant::now()), 0);
        assert!(state.lock_tree().contains("/lock"));

        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(expirer.expire(later), 1);
        assert!(!state.lock_tree().contains("/lock"));
        assert!(!state.sessions.contains(session.id));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(SessionExpirer::new(state).run(rx));
        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
