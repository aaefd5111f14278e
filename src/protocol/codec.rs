//! Jute primitive encoding.
//!
//! Every value is big-endian. Buffers and strings carry an `i32` length
//! prefix where `-1` means null; vectors carry an `i32` element count with the
//! same null convention.

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

/// Failures while decoding or framing client traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The record ended before the expected field.
    #[error("record truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A length prefix was negative (other than the null marker).
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// A watch notification carried an event type this crate does not know.
    #[error("unknown event type {0}")]
    UnknownEventType(i32),

    /// A frame exceeded the configured limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A wire record that can be read from a buffer.
pub trait Decode: Sized {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError>;
}

/// A wire record that can be appended to a buffer.
pub trait Encode {
    fn encode<B: BufMut>(&self, buf: &mut B);
}

fn ensure<B: Buf + ?Sized>(buf: &B, needed: usize) -> Result<(), ProtocolError> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(ProtocolError::Truncated { needed, remaining });
    }
    Ok(())
}

/// Checked jute reads on any [`Buf`].
pub trait JuteRead: Buf {
    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        ensure(self, 4)?;
        Ok(self.get_i32())
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        ensure(self, 8)?;
        Ok(self.get_i64())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        ensure(self, 1)?;
        Ok(self.get_u8() != 0)
    }

    /// Reads a length-prefixed buffer; null decodes as empty.
    fn read_buffer(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.read_i32()?;
        if len == -1 {
            return Ok(Bytes::new());
        }
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        let len = len as usize;
        ensure(self, len)?;
        Ok(self.copy_to_bytes(len))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let raw = self.read_buffer()?;
        Ok(String::from_utf8(raw.to_vec())?)
    }

    /// Reads a counted vector; null decodes as empty.
    fn read_vec<T: Decode>(&mut self) -> Result<Vec<T>, ProtocolError>
    where
        Self: Sized,
    {
        let count = self.read_i32()?;
        if count == -1 {
            return Ok(Vec::new());
        }
        if count < 0 {
            return Err(ProtocolError::NegativeLength(count));
        }
        // Every element is at least one byte; refuse counts the buffer cannot hold.
        ensure(self, count as usize)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }

    fn read_string_vec(&mut self) -> Result<Vec<String>, ProtocolError>
    where
        Self: Sized,
    {
        let count = self.read_i32()?;
        if count == -1 {
            return Ok(Vec::new());
        }
        if count < 0 {
            return Err(ProtocolError::NegativeLength(count));
        }
        ensure(self, count as usize)?;
        (0..count).map(|_| self.read_string()).collect()
    }
}

impl<B: Buf + ?Sized> JuteRead for B {}

/// Jute writes on any [`BufMut`].
pub trait JuteWrite: BufMut {
    fn write_bool(&mut self, flag: bool) {
        self.put_u8(flag as u8);
    }

    fn write_buffer(&mut self, data: &[u8]) {
        self.put_i32(data.len() as i32);
        self.put_slice(data);
    }

    fn write_string(&mut self, s: &str) {
        self.write_buffer(s.as_bytes());
    }

    fn write_vec<T: Encode>(&mut self, items: &[T])
    where
        Self: Sized,
    {
        self.put_i32(items.len() as i32);
        for item in items {
            item.encode(self);
        }
    }

    fn write_string_vec<S: AsRef<str>>(&mut self, items: &[S]) {
        self.put_i32(items.len() as i32);
        for item in items {
            self.write_string(item.as_ref());
        }
    }
}

impl<B: BufMut + ?Sized> JuteWrite for B {}
