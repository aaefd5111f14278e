//! Shared utilities for integration tests: server startup and a raw protocol client.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use zknode::config::{ListenerConfig, ServerConfig};
use zknode::protocol::types::NOTIFICATION_XID;
use zknode::protocol::{
    frame, Acl, ConnectRequest, ConnectResponse, CreateRequest, Decode, DeleteRequest, Encode,
    JuteRead, OpCode, PathRequest, PathWatchRequest, ReplyHeader, RequestHeader, SetDataRequest,
    WatcherEvent,
};
use zknode::tree::Stat;
use zknode::TestingServer;

const MAX_FRAME: usize = 0xfffff + 1024;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback config on an OS-assigned port.
pub fn loopback_config() -> ServerConfig {
    ServerConfig {
        listener: ListenerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 16,
        },
        ..Default::default()
    }
}

pub async fn start_server() -> TestingServer {
    TestingServer::start(loopback_config()).await.unwrap()
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Send a four-letter word and collect the reply.
pub async fn four_letter(addr: SocketAddr, word: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(word.as_bytes()).await.unwrap();
    let mut reply = String::new();
    tokio::time::timeout(REPLY_TIMEOUT, stream.read_to_string(&mut reply))
        .await
        .unwrap()
        .unwrap();
    reply
}

/// Minimal client speaking the binary protocol.
pub struct Client {
    stream: TcpStream,
    xid: i32,
    pub session_id: i64,
    pub password: Bytes,
    pub timeout_ms: i32,
    events: VecDeque<WatcherEvent>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::connect_with(addr, ConnectRequest::new_session(10_000)).await
    }

    /// Connect with an explicit handshake. Panics if the server refuses the session.
    pub async fn connect_with(addr: SocketAddr, request: ConnectRequest) -> Self {
        let (stream, response) = Self::handshake(addr, request).await;
        assert_ne!(response.session_id, 0, "session refused");
        Self {
            stream,
            xid: 0,
            session_id: response.session_id,
            password: response.password,
            timeout_ms: response.timeout_ms,
            events: VecDeque::new(),
        }
    }

    /// Raw handshake, for tests that expect a refusal.
    pub async fn handshake(addr: SocketAddr, request: ConnectRequest) -> (TcpStream, ConnectResponse) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = frame::begin();
        request.encode(&mut buf);
        stream.write_all(&frame::finish(buf)).await.unwrap();

        let mut payload = read_frame(&mut stream).await.expect("connection closed during handshake");
        let response = ConnectResponse::decode(&mut payload).unwrap();
        (stream, response)
    }

    /// Write a request without waiting for anything back. Returns its xid.
    pub async fn submit(&mut self, op: OpCode, record: &impl Encode) -> i32 {
        self.xid += 1;
        let mut buf = frame::begin();
        RequestHeader { xid: self.xid, op: op.code() }.encode(&mut buf);
        record.encode(&mut buf);
        self.stream.write_all(&frame::finish(buf)).await.unwrap();
        self.xid
    }

    /// Header of the next frame on the wire, whatever it is.
    pub async fn next_header(&mut self) -> ReplyHeader {
        let mut payload = read_frame(&mut self.stream).await.expect("connection closed");
        ReplyHeader::decode(&mut payload).unwrap()
    }

    async fn call(&mut self, op: OpCode, record: &impl Encode) -> (ReplyHeader, Bytes) {
        self.submit(op, record).await;

        loop {
            let mut payload = read_frame(&mut self.stream).await.expect("connection closed");
            let header = ReplyHeader::decode(&mut payload).unwrap();
            if header.xid == NOTIFICATION_XID {
                self.events.push_back(WatcherEvent::decode(&mut payload).unwrap());
                continue;
            }
            assert_eq!(header.xid, self.xid);
            return (header, payload);
        }
    }

    pub async fn create(&mut self, path: &str, data: &[u8], flags: i32) -> Result<String, i32> {
        let request = CreateRequest {
            path: path.into(),
            data: Bytes::copy_from_slice(data),
            acl: Acl::open_unsafe(),
            flags,
        };
        let (header, mut body) = self.call(OpCode::Create, &request).await;
        check(&header)?;
        Ok(body.read_string().unwrap())
    }

    pub async fn get_data(&mut self, path: &str, watch: bool) -> Result<(Bytes, Stat), i32> {
        let request = PathWatchRequest { path: path.into(), watch };
        let (header, mut body) = self.call(OpCode::GetData, &request).await;
        check(&header)?;
        let data = body.read_buffer().unwrap();
        Ok((data, Stat::decode(&mut body).unwrap()))
    }

    pub async fn set_data(&mut self, path: &str, data: &[u8], version: i32) -> Result<Stat, i32> {
        let request = SetDataRequest {
            path: path.into(),
            data: Bytes::copy_from_slice(data),
            version,
        };
        let (header, mut body) = self.call(OpCode::SetData, &request).await;
        check(&header)?;
        Ok(Stat::decode(&mut body).unwrap())
    }

    pub async fn delete(&mut self, path: &str, version: i32) -> Result<(), i32> {
        let request = DeleteRequest { path: path.into(), version };
        let (header, _) = self.call(OpCode::Delete, &request).await;
        check(&header)
    }

    pub async fn exists(&mut self, path: &str, watch: bool) -> Result<Stat, i32> {
        let request = PathWatchRequest { path: path.into(), watch };
        let (header, mut body) = self.call(OpCode::Exists, &request).await;
        check(&header)?;
        Ok(Stat::decode(&mut body).unwrap())
    }

    pub async fn children(&mut self, path: &str, watch: bool) -> Result<Vec<String>, i32> {
        let request = PathWatchRequest { path: path.into(), watch };
        let (header, mut body) = self.call(OpCode::GetChildren, &request).await;
        check(&header)?;
        Ok(body.read_string_vec().unwrap())
    }

    pub async fn children_count(&mut self, path: &str) -> Result<i32, i32> {
        let request = PathRequest { path: path.into() };
        let (header, mut body) = self.call(OpCode::GetAllChildrenNumber, &request).await;
        check(&header)?;
        Ok(body.read_i32().unwrap())
    }

    pub async fn ping(&mut self) -> ReplyHeader {
        self.call(OpCode::Ping, &NoBody).await.0
    }

    /// End the session explicitly; the server then closes the socket.
    pub async fn close(mut self) {
        let (header, _) = self.call(OpCode::CloseSession, &NoBody).await;
        assert_eq!(header.err, 0);
        let mut rest = Vec::new();
        let _ = tokio::time::timeout(REPLY_TIMEOUT, self.stream.read_to_end(&mut rest)).await;
    }

    /// Next watch notification, waiting up to five seconds.
    pub async fn next_event(&mut self) -> WatcherEvent {
        if let Some(event) = self.events.pop_front() {
            return event;
        }
        let mut payload = read_frame(&mut self.stream).await.expect("connection closed");
        let header = ReplyHeader::decode(&mut payload).unwrap();
        assert_eq!(header.xid, NOTIFICATION_XID, "expected a notification");
        WatcherEvent::decode(&mut payload).unwrap()
    }
}

struct NoBody;

impl Encode for NoBody {
    fn encode<B: bytes::BufMut>(&self, _buf: &mut B) {}
}

fn check(header: &ReplyHeader) -> Result<(), i32> {
    if header.err == 0 {
        Ok(())
    } else {
        Err(header.err)
    }
}

async fn read_frame(stream: &mut TcpStream) -> Option<Bytes> {
    tokio::time::timeout(REPLY_TIMEOUT, frame::read_frame(stream, MAX_FRAME))
        .await
        .expect("timed out waiting for a frame")
        .unwrap()
}

/// Frame and send arbitrary bytes, for malformed-input tests.
pub async fn send_raw(stream: &mut TcpStream, payload: &[u8]) {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    buf.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    buf.extend_from_slice(payload);
    stream.write_all(&buf).await.unwrap();
}
