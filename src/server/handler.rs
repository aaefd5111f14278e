//! Per-connection task.
//!
//! # Responsibilities
//! - Answer four-letter words and close
//! - Run the connect handshake (new, resumed or refused session)
//! - Pump request frames through the processor and write replies
//! - Interleave watch notifications with replies
//! - Close on idle timeout, protocol error or server shutdown
//!
//! # Design Decisions
//! - A separate reader task owns the read half, so frame reads are never
//!   cancelled midway by `select!`
//! - Watch registrations are dropped when the connection ends; the session
//!   survives until it expires or is closed explicitly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tracing::Instrument;

use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::protocol::types::PROTOCOL_VERSION;
use crate::protocol::{
    frame, ConnectRequest, ConnectResponse, Decode, Encode, FourLetterWord, ProtocolError,
    WatcherEvent,
};
use crate::server::processor::{self, Disposition};
use crate::server::{admin, ServerState};
use crate::session::Session;

/// How long a fresh connection may take to send its first bytes.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve one client connection until it closes.
pub async fn handle(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: broadcast::Receiver<()>,
    guard: ConnectionGuard,
) {
    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
    async move {
        if let Err(e) = serve(&state, stream, guard.id(), shutdown).await {
            tracing::debug!(error = %e, "Connection ended with error");
        }
        state.watches.detach(guard.id());
        tracing::debug!("Connection closed");
    }
    .instrument(span)
    .await
}

async fn serve(
    state: &Arc<ServerState>,
    mut stream: TcpStream,
    conn: ConnectionId,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ProtocolError> {
    let max_frame = state.config.protocol.max_frame_bytes;

    let mut prefix = [0u8; 4];
    let first = tokio::select! {
        read = time::timeout(HANDSHAKE_TIMEOUT, stream.read_exact(&mut prefix)) => read,
        _ = shutdown.recv() => return Ok(()),
    };
    match first {
        Err(_) => {
            tracing::debug!("Handshake timed out");
            return Ok(());
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    if state.config.protocol.four_letter_words {
        if let Some(word) = FourLetterWord::parse(&prefix) {
            tracing::debug!(command = word.as_str(), "Four-letter word");
            let reply = admin::respond(state, word);
            stream.write_all(reply.as_bytes()).await?;
            stream.shutdown().await?;
            return Ok(());
        }
    }

    let mut payload = frame::read_payload(&mut stream, i32::from_be_bytes(prefix), max_frame).await?;
    let request = ConnectRequest::decode(&mut payload)?;

    let Some(session) = establish(state, &request) else {
        let mut buf = frame::begin();
        ConnectResponse::expired(request.read_only).encode(&mut buf);
        stream.write_all(&frame::finish(buf)).await?;
        return Ok(());
    };

    let mut buf = frame::begin();
    ConnectResponse {
        protocol_version: PROTOCOL_VERSION,
        timeout_ms: i32::try_from(session.timeout.as_millis()).unwrap_or(i32::MAX),
        session_id: session.id,
        password: session.password.clone(),
        read_only: request.read_only.map(|_| false),
    }
    .encode(&mut buf);
    stream.write_all(&frame::finish(buf)).await?;
    state.publish_gauges(&state.lock_tree());

    let (reader, writer) = stream.into_split();
    let (frame_tx, frame_rx) = mpsc::channel(32);
    let reader_task = tokio::spawn(read_frames(reader, max_frame, frame_tx));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    state.watches.attach(conn, event_tx);

    let result = session_loop(
        state, &session, conn, writer, frame_rx, event_rx, &mut shutdown,
    )
    .await;
    reader_task.abort();
    result
}

/// Resolve the handshake to a live session, or `None` to refuse it.
fn establish(state: &ServerState, request: &ConnectRequest) -> Option<Session> {
    if request.session_id == 0 {
        let session = state.sessions.create(request.timeout_ms);
        tracing::info!(
            session_id = %format!("0x{:x}", session.id),
            timeout_ms = session.timeout.as_millis() as u64,
            "Session established"
        );
        return Some(session);
    }

    let resumed = state
        .sessions
        .resume(request.session_id, &request.password, request.timeout_ms);
    match &resumed {
        Some(session) => {
            tracing::info!(session_id = %format!("0x{:x}", session.id), "Session resumed");
        }
        None => {
            tracing::info!(
                session_id = %format!("0x{:x}", request.session_id),
                "Refusing unknown or expired session"
            );
        }
    }
    resumed
}

async fn read_frames(
    mut reader: OwnedReadHalf,
    max_frame: usize,
    frames: mpsc::Sender<Result<Bytes, ProtocolError>>,
) {
    loop {
        match frame::read_frame(&mut reader, max_frame).await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = frames.send(Err(e)).await;
                break;
            }
        }
    }
}

async fn session_loop(
    state: &Arc<ServerState>,
    session: &Session,
    conn: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::Receiver<Result<Bytes, ProtocolError>>,
    mut events: mpsc::UnboundedReceiver<WatcherEvent>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ProtocolError> {
    let idle = time::sleep(session.timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            // pending notifications always go out before the next reply
            biased;

            Some(event) = events.recv() => {
                writer.write_all(&processor::notification(state, &event)).await?;
            }
            next = frames.recv() => {
                let Some(next) = next else {
                    tracing::debug!("Client disconnected");
                    return Ok(());
                };
                let (reply, disposition) = processor::process(state, session.id, conn, next?);
                // a watch fired by this very request precedes its reply
                while let Ok(event) = events.try_recv() {
                    writer.write_all(&processor::notification(state, &event)).await?;
                }
                writer.write_all(&reply).await?;
                if disposition == Disposition::Close {
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
                idle.as_mut().reset(Instant::now() + session.timeout);
            }
            _ = &mut idle => {
                tracing::info!(
                    session_id = %format!("0x{:x}", session.id),
                    "Closing idle connection"
                );
                return Ok(());
            }
            _ = shutdown.recv() => {
                tracing::debug!("Connection received shutdown signal");
                return Ok(());
            }
        }
    }
}
