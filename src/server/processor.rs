//! Request processing.
//!
//! # Responsibilities
//! - Decode the request header and body of one frame
//! - Apply it to the tree under the tree lock
//! - Register and fire watches in the same critical section
//! - Encode the reply frame
//!
//! Never performs I/O; the connection task writes what this returns.

use std::sync::atomic::Ordering;

use bytes::{BufMut, Bytes, BytesMut};

use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::{
    frame, CreateMode, CreateRequest, Decode, DeleteRequest, Encode, ErrorCode, EventType,
    JuteWrite, OpCode, PathRequest, PathWatchRequest, ProtocolError, ReplyHeader, RequestHeader,
    SetAclRequest, SetDataRequest, SetWatchesRequest, WatcherEvent,
};
use crate::protocol::types::NOTIFICATION_XID;
use crate::server::ServerState;
use crate::tree::{path, DataTree};
use crate::watch::WatchKind;

/// What the connection does after sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

enum Failure {
    Code(ErrorCode),
    Malformed(ProtocolError),
}

impl From<ErrorCode> for Failure {
    fn from(code: ErrorCode) -> Self {
        Failure::Code(code)
    }
}

impl From<ProtocolError> for Failure {
    fn from(err: ProtocolError) -> Self {
        Failure::Malformed(err)
    }
}

/// Handle one request frame from `session_id` on connection `conn`.
pub fn process(
    state: &ServerState,
    session_id: i64,
    conn: ConnectionId,
    mut frame: Bytes,
) -> (Bytes, Disposition) {
    state.packets_received.fetch_add(1, Ordering::Relaxed);

    let header = match RequestHeader::decode(&mut frame) {
        Ok(header) => header,
        Err(err) => {
            tracing::warn!(error = %err, "Undecodable request header");
            let zxid = state.lock_tree().last_zxid();
            return (
                reply(state, ReplyHeader::new(0, zxid, ErrorCode::MarshallingError), None),
                Disposition::Close,
            );
        }
    };

    if !state.sessions.touch(session_id) {
        let zxid = state.lock_tree().last_zxid();
        return (
            reply(state, ReplyHeader::new(header.xid, zxid, ErrorCode::SessionExpired), None),
            Disposition::Close,
        );
    }

    let op = match OpCode::try_from(header.op) {
        Ok(op) => op,
        Err(code) => {
            tracing::debug!(op = code, "Unimplemented op");
            let zxid = state.lock_tree().last_zxid();
            return (
                reply(state, ReplyHeader::new(header.xid, zxid, ErrorCode::Unimplemented), None),
                Disposition::Continue,
            );
        }
    };
    metrics::record_request(op.name());

    let mut body = BytesMut::new();
    let mut tree = state.lock_tree();
    let outcome = dispatch(state, &mut tree, session_id, conn, op, &mut frame, &mut body);
    let zxid = tree.last_zxid();
    if op.is_write() {
        state.publish_gauges(&tree);
    }
    drop(tree);

    let disposition = if op == OpCode::CloseSession {
        Disposition::Close
    } else {
        Disposition::Continue
    };

    match outcome {
        Ok(()) => (
            reply(state, ReplyHeader::new(header.xid, zxid, ErrorCode::Ok), Some(&body)),
            disposition,
        ),
        Err(Failure::Code(code)) => {
            tracing::trace!(op = op.name(), error = %code, "Request failed");
            (reply(state, ReplyHeader::new(header.xid, zxid, code), None), disposition)
        }
        Err(Failure::Malformed(err)) => {
            tracing::warn!(op = op.name(), error = %err, "Malformed request body");
            (
                reply(state, ReplyHeader::new(header.xid, zxid, ErrorCode::MarshallingError), None),
                Disposition::Close,
            )
        }
    }
}

/// Frame a watch notification.
pub fn notification(state: &ServerState, event: &WatcherEvent) -> Bytes {
    let mut buf = frame::begin();
    ReplyHeader::new(NOTIFICATION_XID, -1, ErrorCode::Ok).encode(&mut buf);
    event.encode(&mut buf);
    state.packets_sent.fetch_add(1, Ordering::Relaxed);
    frame::finish(buf)
}

fn reply(state: &ServerState, header: ReplyHeader, body: Option<&BytesMut>) -> Bytes {
    let mut buf = frame::begin();
    header.encode(&mut buf);
    if let Some(body) = body {
        buf.extend_from_slice(body);
    }
    state.packets_sent.fetch_add(1, Ordering::Relaxed);
    frame::finish(buf)
}

fn dispatch(
    state: &ServerState,
    tree: &mut DataTree,
    session_id: i64,
    conn: ConnectionId,
    op: OpCode,
    request: &mut Bytes,
    body: &mut BytesMut,
) -> Result<(), Failure> {
    let watches = &state.watches;
    match op {
        OpCode::Create | OpCode::Create2 => {
            let req = CreateRequest::decode(request)?;
            let mode = CreateMode::from_flags(req.flags).ok_or(ErrorCode::BadArguments)?;
            let (created, stat) = tree.create(&req.path, req.data, req.acl, mode, session_id)?;
            watches.node_created(&created);
            body.write_string(&created);
            if op == OpCode::Create2 {
                stat.encode(body);
            }
        }
        OpCode::Delete => {
            let req = DeleteRequest::decode(request)?;
            tree.delete(&req.path, req.version)?;
            watches.node_deleted(&req.path);
        }
        OpCode::Exists => {
            let req = PathWatchRequest::decode(request)?;
            path::validate(&req.path, false)?;
            let stat = tree.stat(&req.path);
            // a watch on a missing node fires on its creation
            if req.watch {
                watches.add(&req.path, WatchKind::Data, conn);
            }
            stat.ok_or(ErrorCode::NoNode)?.encode(body);
        }
        OpCode::GetData => {
            let req = PathWatchRequest::decode(request)?;
            let (data, stat) = tree.get_data(&req.path)?;
            if req.watch {
                watches.add(&req.path, WatchKind::Data, conn);
            }
            body.write_buffer(&data);
            stat.encode(body);
        }
        OpCode::SetData => {
            let req = SetDataRequest::decode(request)?;
            let stat = tree.set_data(&req.path, req.data, req.version)?;
            watches.trigger(&req.path, EventType::NodeDataChanged);
            stat.encode(body);
        }
        OpCode::GetAcl => {
            let req = PathRequest::decode(request)?;
            let (acl, stat) = tree.get_acl(&req.path)?;
            body.write_vec(&acl);
            stat.encode(body);
        }
        OpCode::SetAcl => {
            let req = SetAclRequest::decode(request)?;
            let stat = tree.set_acl(&req.path, req.acl, req.version)?;
            stat.encode(body);
        }
        OpCode::GetChildren | OpCode::GetChildren2 => {
            let req = PathWatchRequest::decode(request)?;
            let (children, stat) = tree.children(&req.path)?;
            if req.watch {
                watches.add(&req.path, WatchKind::Child, conn);
            }
            body.write_string_vec(&children);
            if op == OpCode::GetChildren2 {
                stat.encode(body);
            }
        }
        OpCode::GetAllChildrenNumber => {
            let req = PathRequest::decode(request)?;
            let total = tree.descendant_count(&req.path)?;
            body.put_i32(i32::try_from(total).unwrap_or(i32::MAX));
        }
        OpCode::Sync => {
            let req = PathRequest::decode(request)?;
            path::validate(&req.path, false)?;
            body.write_string(&req.path);
        }
        OpCode::Ping | OpCode::Auth => {}
        OpCode::SetWatches => {
            let req = SetWatchesRequest::decode(request)?;
            restore_watches(state, tree, conn, &req);
        }
        OpCode::CloseSession => {
            state.sessions.remove(session_id);
            let removed = state.drop_ephemerals(tree, session_id);
            tracing::info!(
                session_id = %format!("0x{:x}", session_id),
                ephemerals = removed.len(),
                "Session closed"
            );
        }
    }
    Ok(())
}

/// Re-register watches a client held before reconnecting.
///
/// Anything that changed after `relative_zxid` fires right away instead.
fn restore_watches(state: &ServerState, tree: &DataTree, conn: ConnectionId, req: &SetWatchesRequest) {
    let watches = &state.watches;
    let relative = req.relative_zxid;
    let fire = |event_type, path: &str| {
        watches.notify(conn, WatcherEvent::new(event_type, path));
    };

    for path in &req.data_watches {
        match tree.stat(path) {
            None => fire(EventType::NodeDeleted, path),
            Some(stat) if stat.mzxid > relative => fire(EventType::NodeDataChanged, path),
            Some(_) => watches.add(path, WatchKind::Data, conn),
        }
    }
    for path in &req.exist_watches {
        match tree.stat(path) {
            Some(_) => fire(EventType::NodeCreated, path),
            None => watches.add(path, WatchKind::Data, conn),
        }
    }
    for path in &req.child_watches {
        match tree.stat(path) {
            None => fire(EventType::NodeDeleted, path),
            Some(stat) if stat.pzxid > relative => fire(EventType::NodeChildrenChanged, path),
            Some(_) => watches.add(path, WatchKind::Child, conn),
        }
    }
}
