//! Session table.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use rand::RngCore;

use crate::protocol::types::SESSION_PASSWORD_LEN;

/// A client session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub password: Bytes,
    pub timeout: Duration,
    pub last_seen: Instant,
}

impl Session {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_seen) > self.timeout
    }
}

/// Issues, resumes and expires sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<i64, Session>,
    next_id: AtomicI64,
    min_timeout: Duration,
    max_timeout: Duration,
}

/// First session id for a server: server id in the top byte, start time below.
pub fn initial_session_id(server_id: u8) -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let seed = (millis << 24) >> 8;
    (seed | ((server_id as u64) << 56)) as i64
}

impl SessionManager {
    pub fn new(server_id: u8, min_timeout: Duration, max_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicI64::new(initial_session_id(server_id)),
            min_timeout,
            max_timeout,
        }
    }

    /// Clamp a client-requested timeout into the configured bounds.
    pub fn negotiate_timeout(&self, requested_ms: i32) -> Duration {
        let requested = Duration::from_millis(requested_ms.max(0) as u64);
        requested.clamp(self.min_timeout, self.max_timeout)
    }

    /// Open a new session.
    pub fn create(&self, requested_timeout_ms: i32) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut password = vec![0u8; SESSION_PASSWORD_LEN];
        rand::thread_rng().fill_bytes(&mut password);

        let session = Session {
            id,
            password: Bytes::from(password),
            timeout: self.negotiate_timeout(requested_timeout_ms),
            last_seen: Instant::now(),
        };
        self.sessions.insert(id, session.clone());
        session
    }

    /// Re-attach to a live session. Fails on unknown id, wrong password or expiry.
    pub fn resume(&self, id: i64, password: &[u8], requested_timeout_ms: i32) -> Option<Session> {
        let timeout = self.negotiate_timeout(requested_timeout_ms);
        let mut entry = self.sessions.get_mut(&id)?;
        let now = Instant::now();
        if entry.password.as_ref() != password || entry.is_expired(now) {
            return None;
        }
        entry.last_seen = now;
        entry.timeout = timeout;
        Some(entry.clone())
    }

    /// Record activity. Returns false when the session no longer exists.
    pub fn touch(&self, id: i64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn remove(&self, id: i64) -> Option<Session> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    /// Remove and return every session whose timeout has elapsed.
    pub fn take_expired(&self, now: Instant) -> Vec<Session> {
        let expired: Vec<i64> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            // re-check: a request may have touched the session in between
            .filter_map(|id| {
                self.sessions
                    .remove_if(&id, |_, session| session.is_expired(now))
                    .map(|(_, session)| session)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
