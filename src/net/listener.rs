//! Client port listener.
//!
//! Owns the bound socket for the lifetime of a server. At most
//! `max_connections` clients are served at once; when every slot is taken the
//! next accept waits for one to free up instead of refusing the client.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Failure on the client port.
#[derive(Debug)]
pub enum ListenerError {
    /// The port could not be bound (in use, no permission, bad address).
    Bind(io::Error),
    /// `accept(2)` failed; usually transient (fd exhaustion, aborted handshake).
    Accept(io::Error),
    /// The slot semaphore was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "cannot bind client port: {}", e),
            ListenerError::Accept(e) => write!(f, "accept on client port failed: {}", e),
            ListenerError::Closed => f.write_str("client slots closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Closed => None,
        }
    }
}

/// One of the `max_connections` client slots. Dropping it frees the slot,
/// even if the connection task panicked.
#[derive(Debug)]
pub struct ClientSlot(#[allow(dead_code)] OwnedSemaphorePermit);

/// An accepted client and the slot it occupies.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub slot: ClientSlot,
}

pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address()
            .parse()
            .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;

        tracing::debug!(
            address = %addr,
            capacity = config.max_connections,
            "Client port bound"
        );

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Wait for a free slot, then for a client.
    ///
    /// Cancel-safe: dropping the future before a client arrives gives the
    /// slot back.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        // replies are small; do not let Nagle hold them back
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(peer = %peer, error = %e, "Could not disable Nagle");
        }

        tracing::trace!(
            peer = %peer,
            free_slots = self.slots.available_permits(),
            "Client accepted"
        );
        Ok(Accepted {
            stream,
            peer,
            slot: ClientSlot(slot),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections,
        }
    }

    #[tokio::test]
    async fn port_zero_gets_a_real_port() {
        let listener = Listener::bind(&loopback(4)).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
        assert_eq!(listener.capacity(), 4);
        assert_eq!(listener.free_slots(), 4);
    }

    #[tokio::test]
    async fn taken_port_is_a_bind_error() {
        let first = Listener::bind(&loopback(1)).await.unwrap();
        let mut config = loopback(1);
        config.port = first.local_addr().unwrap().port();

        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind(_)));
        assert!(err.to_string().starts_with("cannot bind client port"));
    }

    #[tokio::test]
    async fn slot_is_held_until_dropped() {
        let listener = Listener::bind(&loopback(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let accepted = listener.accept().await.unwrap();
        assert_eq!(accepted.peer.ip(), addr.ip());
        assert_eq!(listener.free_slots(), 1);

        drop(accepted);
        assert_eq!(listener.free_slots(), 2);
    }
}
