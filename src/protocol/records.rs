//! Request and response records.
//!
//! Field order follows the jute definitions clients are compiled against.
//! Requests implement both directions so test clients can reuse them.

use bytes::{Buf, BufMut, Bytes};

use crate::protocol::codec::{Decode, Encode, JuteRead, JuteWrite, ProtocolError};
use crate::protocol::types::{perms, ErrorCode, EventType, PROTOCOL_VERSION, SYNC_CONNECTED};
use crate::tree::Stat;

/// An access control entry. Stored and echoed, not enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: i32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    /// `world:anyone` with every permission.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl {
            perms: perms::ALL,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }

    /// `world:anyone` read-only, used for the `/zookeeper` subtree.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl {
            perms: perms::READ,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }
}

impl Encode for Acl {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.perms);
        buf.write_string(&self.scheme);
        buf.write_string(&self.id);
    }
}

impl Decode for Acl {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            perms: buf.read_i32()?,
            scheme: buf.read_string()?,
            id: buf.read_string()?,
        })
    }
}

impl Encode for Stat {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64(self.czxid);
        buf.put_i64(self.mzxid);
        buf.put_i64(self.ctime);
        buf.put_i64(self.mtime);
        buf.put_i32(self.version);
        buf.put_i32(self.cversion);
        buf.put_i32(self.aversion);
        buf.put_i64(self.ephemeral_owner);
        buf.put_i32(self.data_length);
        buf.put_i32(self.num_children);
        buf.put_i64(self.pzxid);
    }
}

impl Decode for Stat {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            czxid: buf.read_i64()?,
            mzxid: buf.read_i64()?,
            ctime: buf.read_i64()?,
            mtime: buf.read_i64()?,
            version: buf.read_i32()?,
            cversion: buf.read_i32()?,
            aversion: buf.read_i32()?,
            ephemeral_owner: buf.read_i64()?,
            data_length: buf.read_i32()?,
            num_children: buf.read_i32()?,
            pzxid: buf.read_i64()?,
        })
    }
}

/// First packet of every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Bytes,
    /// Older clients omit the trailing flag entirely.
    pub read_only: Option<bool>,
}

impl ConnectRequest {
    /// A request for a brand-new session.
    pub fn new_session(timeout_ms: i32) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            last_zxid_seen: 0,
            timeout_ms,
            session_id: 0,
            password: Bytes::from_static(&[0; 16]),
            read_only: Some(false),
        }
    }
}

impl Decode for ConnectRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        let protocol_version = buf.read_i32()?;
        let last_zxid_seen = buf.read_i64()?;
        let timeout_ms = buf.read_i32()?;
        let session_id = buf.read_i64()?;
        let password = buf.read_buffer()?;
        let read_only = if buf.has_remaining() {
            Some(buf.read_bool()?)
        } else {
            None
        };
        Ok(Self {
            protocol_version,
            last_zxid_seen,
            timeout_ms,
            session_id,
            password,
            read_only,
        })
    }
}

impl Encode for ConnectRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.protocol_version);
        buf.put_i64(self.last_zxid_seen);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        buf.write_buffer(&self.password);
        if let Some(read_only) = self.read_only {
            buf.write_bool(read_only);
        }
    }
}

/// Reply to [`ConnectRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Bytes,
    pub read_only: Option<bool>,
}

impl ConnectResponse {
    /// The answer for an expired or unknown session: everything zeroed.
    pub fn expired(read_only: Option<bool>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            timeout_ms: 0,
            session_id: 0,
            password: Bytes::from_static(&[0; 16]),
            read_only: read_only.map(|_| false),
        }
    }
}

impl Encode for ConnectResponse {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.protocol_version);
        buf.put_i32(self.timeout_ms);
        buf.put_i64(self.session_id);
        buf.write_buffer(&self.password);
        if let Some(read_only) = self.read_only {
            buf.write_bool(read_only);
        }
    }
}

impl Decode for ConnectResponse {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        let protocol_version = buf.read_i32()?;
        let timeout_ms = buf.read_i32()?;
        let session_id = buf.read_i64()?;
        let password = buf.read_buffer()?;
        let read_only = if buf.has_remaining() {
            Some(buf.read_bool()?)
        } else {
            None
        };
        Ok(Self {
            protocol_version,
            timeout_ms,
            session_id,
            password,
            read_only,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub xid: i32,
    pub op: i32,
}

impl Decode for RequestHeader {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            xid: buf.read_i32()?,
            op: buf.read_i32()?,
        })
    }
}

impl Encode for RequestHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.xid);
        buf.put_i32(self.op);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    pub err: i32,
}

impl ReplyHeader {
    pub fn new(xid: i32, zxid: i64, err: ErrorCode) -> Self {
        Self {
            xid,
            zxid,
            err: err.code(),
        }
    }
}

impl Encode for ReplyHeader {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.xid);
        buf.put_i64(self.zxid);
        buf.put_i32(self.err);
    }
}

impl Decode for ReplyHeader {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            xid: buf.read_i32()?,
            zxid: buf.read_i64()?,
            err: buf.read_i32()?,
        })
    }
}

/// Body of `create` and `create2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub path: String,
    pub data: Bytes,
    pub acl: Vec<Acl>,
    pub flags: i32,
}

impl Decode for CreateRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
            data: buf.read_buffer()?,
            acl: buf.read_vec()?,
            flags: buf.read_i32()?,
        })
    }
}

impl Encode for CreateRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
        buf.write_buffer(&self.data);
        buf.write_vec(&self.acl);
        buf.put_i32(self.flags);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub path: String,
    pub version: i32,
}

impl Decode for DeleteRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
            version: buf.read_i32()?,
        })
    }
}

impl Encode for DeleteRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
        buf.put_i32(self.version);
    }
}

/// Body shared by `exists`, `getData`, `getChildren` and `getChildren2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathWatchRequest {
    pub path: String,
    pub watch: bool,
}

impl Decode for PathWatchRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
            watch: buf.read_bool()?,
        })
    }
}

impl Encode for PathWatchRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
        buf.write_bool(self.watch);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDataRequest {
    pub path: String,
    pub data: Bytes,
    pub version: i32,
}

impl Decode for SetDataRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
            data: buf.read_buffer()?,
            version: buf.read_i32()?,
        })
    }
}

impl Encode for SetDataRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
        buf.write_buffer(&self.data);
        buf.put_i32(self.version);
    }
}

/// Body shared by `getACL` and `sync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub path: String,
}

impl Decode for PathRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
        })
    }
}

impl Encode for PathRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAclRequest {
    pub path: String,
    pub acl: Vec<Acl>,
    pub version: i32,
}

impl Decode for SetAclRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            path: buf.read_string()?,
            acl: buf.read_vec()?,
            version: buf.read_i32()?,
        })
    }
}

impl Encode for SetAclRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.write_string(&self.path);
        buf.write_vec(&self.acl);
        buf.put_i32(self.version);
    }
}

/// Watches a reconnecting client wants restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetWatchesRequest {
    pub relative_zxid: i64,
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl Decode for SetWatchesRequest {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        Ok(Self {
            relative_zxid: buf.read_i64()?,
            data_watches: buf.read_string_vec()?,
            exist_watches: buf.read_string_vec()?,
            child_watches: buf.read_string_vec()?,
        })
    }
}

impl Encode for SetWatchesRequest {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64(self.relative_zxid);
        buf.write_string_vec(&self.data_watches);
        buf.write_string_vec(&self.exist_watches);
        buf.write_string_vec(&self.child_watches);
    }
}

/// Payload of a watch notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    pub event_type: EventType,
    pub state: i32,
    pub path: String,
}

impl WatcherEvent {
    pub fn new(event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            event_type,
            state: SYNC_CONNECTED,
            path: path.into(),
        }
    }
}

impl Encode for WatcherEvent {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.event_type as i32);
        buf.put_i32(self.state);
        buf.write_string(&self.path);
    }
}

impl Decode for WatcherEvent {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        let raw_type = buf.read_i32()?;
        let event_type = EventType::try_from(raw_type)
            .map_err(ProtocolError::UnknownEventType)?;
        Ok(Self {
            event_type,
            state: buf.read_i32()?,
            path: buf.read_string()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn connect_request_without_read_only_flag() {
        let mut buf = BytesMut::new();
        buf.put_i32(0);
        buf.put_i64(0);
        buf.put_i32(30_000);
        buf.put_i64(0);
        buf.write_buffer(&[0; 16]);
        let mut bytes = buf.freeze();

        let request = ConnectRequest::decode(&mut bytes).unwrap();
        assert_eq!(request.timeout_ms, 30_000);
        assert_eq!(request.read_only, None);
    }

    #[test]
    fn expired_response_is_all_zero() {
        let response = ConnectResponse::expired(Some(true));
        assert_eq!(response.session_id, 0);
        assert_eq!(response.timeout_ms, 0);
        assert_eq!(response.read_only, Some(false));
        assert!(response.password.iter().all(|b| *b == 0));
    }

    #[test]
    fn stat_is_sixty_eight_bytes() {
        let mut buf = BytesMut::new();
        Stat::default().encode(&mut buf);
        assert_eq!(buf.len(), 68);
    }

    #[test]
    fn create_request_decodes_acl_list() {
        let request = CreateRequest {
            path: "/app".into(),
            data: Bytes::from_static(b"cfg"),
            acl: Acl::open_unsafe(),
            flags: 1,
        };
        let mut buf = BytesMut::new();
        request.encode(&mut buf);

        let decoded = CreateRequest::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.acl[0].scheme, "world");
        assert_eq!(decoded.acl[0].perms, perms::ALL);
        assert_eq!(decoded.flags, 1);
    }

    #[test]
    fn reply_header_layout() {
        let mut buf = BytesMut::new();
        ReplyHeader::new(7, 42, ErrorCode::NoNode).encode(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[12..], &(-101i32).to_be_bytes());
    }
}
