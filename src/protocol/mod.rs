//! Client wire protocol.
//!
//! # Data Flow
//! ```text
//! TCP bytes
//!     → frame.rs (i32 length prefix, size limit)
//!     → four_letter.rs (admin words on a fresh connection)
//!     → records.rs (connect handshake, request header + body)
//!     → server::processor
//!     → records.rs (reply header + body, watch notifications)
//!     → frame.rs → TCP bytes
//! ```
//!
//! # Design Decisions
//! - Decoding is checked: truncated or malformed records are errors, never panics
//! - Records are plain structs; `Encode`/`Decode` are the only seams
//! - Protocol error codes (`ErrorCode`) travel in reply headers and are never
//!   Rust errors

pub mod codec;
pub mod four_letter;
pub mod frame;
pub mod records;
pub mod types;

pub use codec::{Decode, Encode, JuteRead, JuteWrite, ProtocolError};
pub use four_letter::FourLetterWord;
pub use records::*;
pub use types::{CreateMode, ErrorCode, EventType, OpCode};
