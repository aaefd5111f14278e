//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the server from a validated configuration
//! - Confirm it answers `ruok` before reporting it ready
//! - Release a half-started server when that check fails
//! - Apply the failure policy: report and continue, or report and fail
//!
//! # Design Decisions
//! - `bootstrap` returns an explicit `Result`; only `run_best_effort`
//!   decides whether a failure ends the process unsuccessfully
//! - The diagnostic goes to stderr with the full cause chain, independent of
//!   the log filter

use std::future::Future;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::{ConfigError, FailurePolicy, ServerConfig, ValidationError};
use crate::net::listener::ListenerError;
use crate::observability::metrics;
use crate::server::TestingServer;

/// Why the server could not be brought up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error("could not load configuration")]
    Config(#[from] ConfigError),

    #[error("could not bind client port {addr}")]
    Bind {
        addr: String,
        #[source]
        source: ListenerError,
    },

    #[error("server on {addr} did not answer the readiness probe")]
    NotReady {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Start a server and wait until it answers `ruok` on its client port.
pub async fn bootstrap(config: &ServerConfig) -> Result<TestingServer, StartupError> {
    bootstrap_with(config, probe).await
}

/// Like [`bootstrap`], with `ready` deciding whether the bound server is usable.
///
/// `ready` gets the address to dial and the configured deadline. When it fails
/// the server is closed before the error is returned.
pub async fn bootstrap_with<P, Fut>(config: &ServerConfig, ready: P) -> Result<TestingServer, StartupError>
where
    P: FnOnce(SocketAddr, Duration) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    tracing::info!(
        address = %config.listener.bind_address(),
        max_connections = config.listener.max_connections,
        tick_time_ms = config.session.tick_time_ms,
        "Starting coordination server"
    );

    let server = TestingServer::start(config.clone()).await?;
    if !config.protocol.four_letter_words {
        return Ok(server);
    }

    let addr = server.client_addr();
    let deadline = Duration::from_millis(config.startup.ready_timeout_ms);
    match ready(addr, deadline).await {
        Ok(()) => {
            tracing::info!(address = %addr, "Coordination server ready");
            Ok(server)
        }
        Err(source) => {
            release(server).await;
            Err(StartupError::NotReady { addr, source })
        }
    }
}

/// Send `ruok` and expect `imok`.
async fn probe(addr: SocketAddr, deadline: Duration) -> io::Result<()> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(b"ruok").await?;
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        if reply != b"imok" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply {:?}", String::from_utf8_lossy(&reply)),
            ));
        }
        Ok(())
    };
    time::timeout(deadline, exchange)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "readiness probe timed out"))?
}

/// Close a server, logging rather than returning any secondary failure.
pub async fn release(server: TestingServer) {
    if let Err(e) = server.close().await {
        tracing::warn!(error = %e, "Failed to release coordination server");
    }
}

/// Start, serve until `until` resolves, then release.
///
/// A startup failure is reported on stderr. Under [`FailurePolicy::Log`] it is
/// swallowed and this returns `Ok(())`.
pub async fn run_best_effort<F>(config: ServerConfig, until: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    match bootstrap(&config).await {
        Ok(server) => {
            until.await;
            release(server).await;
            Ok(())
        }
        Err(err) => handle_failure(err, config.startup.failure_policy),
    }
}

/// Report a startup failure and apply `policy`.
pub fn handle_failure(err: StartupError, policy: FailurePolicy) -> Result<(), StartupError> {
    metrics::record_startup_failure();
    tracing::error!(error = %err, ?policy, "Startup failed");
    report_failure(&err, &mut io::stderr().lock());
    match policy {
        FailurePolicy::Log => Ok(()),
        FailurePolicy::Fail => Err(err),
    }
}

/// Write `err` and its cause chain.
pub fn report_failure<W: Write>(err: &(dyn std::error::Error + 'static), out: &mut W) {
    let _ = writeln!(out, "startup failed: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = writeln!(out, "  caused by: {}", cause);
        source = cause.source();
    }
    let _ = out.flush();
}
