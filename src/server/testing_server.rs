//! The server handle.
//!
//! Owning a `TestingServer` means owning the client port: the listener lives
//! in the accept task and is dropped when the handle is closed or dropped.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{validate_config, ServerConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::startup::StartupError;
use crate::net::listener::{Accepted, Listener, ListenerError};
use crate::server::{handler, ServerState, ServerStats};
use crate::session::SessionExpirer;

/// How long `close` waits for connection tasks to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Failure while releasing a server.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("background task failed during shutdown")]
    Task(#[from] JoinError),
}

/// A running standalone server bound to its client port.
pub struct TestingServer {
    state: Arc<ServerState>,
    local_addr: SocketAddr,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl TestingServer {
    /// Validate `config`, bind the client port and start serving.
    pub async fn start(mut config: ServerConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::InvalidConfig)?;

        let addr = config.listener.bind_address();
        let listener = Listener::bind(&config.listener)
            .await
            .map_err(|source| StartupError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|e| StartupError::Bind {
            addr,
            source: ListenerError::Bind(e),
        })?;
        config.listener.port = local_addr.port();

        let state = Arc::new(ServerState::new(config));
        let shutdown = Shutdown::new();

        let expirer = SessionExpirer::new(Arc::clone(&state));
        let tasks = vec![
            tokio::spawn(expirer.run(shutdown.subscribe())),
            tokio::spawn(accept_loop(
                listener,
                Arc::clone(&state),
                shutdown.clone(),
                shutdown.subscribe(),
            )),
        ];

        tracing::info!(address = %local_addr, "Coordination server started");

        Ok(Self {
            state,
            local_addr,
            shutdown,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Address a local client should dial. Wildcard binds map to loopback.
    pub fn client_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }

    /// Connection string in the `host:port` form clients expect.
    pub fn connect_string(&self) -> String {
        self.client_addr().to_string()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn stats(&self) -> ServerStats {
        self.state.stats()
    }

    /// Stop accepting, release the port and wait for connections to wind down.
    pub async fn close(mut self) -> Result<(), CloseError> {
        tracing::info!(address = %self.local_addr, "Closing coordination server");
        self.shutdown.trigger();

        for task in std::mem::take(&mut self.tasks) {
            task.await?;
        }

        if !self.state.connections.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = self.state.connections.active_count(),
                "Connections still open after drain timeout"
            );
        }
        tracing::info!("Coordination server closed");
        Ok(())
    }
}

impl Drop for TestingServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TestingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestingServer")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: Listener,
    state: Arc<ServerState>,
    shutdown: Shutdown,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(Accepted { stream, peer, slot }) => {
                    let Some(connection_shutdown) = shutdown.subscribe_unless_triggered() else {
                        break;
                    };
                    let guard = state.connections.track();
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        handler::handle(state, stream, peer, connection_shutdown, guard).await;
                        drop(slot);
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = stop.recv() => {
                tracing::debug!("Accept loop received shutdown signal");
                break;
            }
        }
    }
    // dropping `listener` here releases the port
}
