//! Length-prefixed framing.
//!
//! Every packet in either direction is an `i32` payload length followed by the
//! payload. Outgoing frames reserve the prefix up front and patch it once the
//! payload is written.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::codec::ProtocolError;

/// Start an outgoing frame with a placeholder length prefix.
pub fn begin() -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_i32(0);
    buf
}

/// Patch the length prefix and freeze the frame.
pub fn finish(mut buf: BytesMut) -> Bytes {
    let len = (buf.len() - 4) as i32;
    buf[..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

/// Read a payload whose length prefix has already been consumed.
pub async fn read_payload<R>(reader: &mut R, len: i32, max: usize) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    if len < 0 {
        return Err(ProtocolError::NegativeLength(len));
    }
    let len = len as usize;
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Read one frame. Returns `Ok(None)` when the peer closes between frames.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Bytes>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = i32::from_be_bytes(prefix);
    read_payload(reader, len, max).await.map(Some)
}
