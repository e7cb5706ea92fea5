//! Opcode + length-prefixed JSON framing.
//!
//! Every message is framed with:
//! - A 4-byte little-endian opcode
//! - A 4-byte little-endian payload length
//! - The payload: UTF-8 JSON
//!
//! Only the header is binary. No partial reads, no buffer management in user
//! code.

pub mod codec;
pub mod error;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, encode_json, Frame, FrameHeader, Message, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use opcode::{opcode_name, CLOSE, FRAME, HANDSHAKE, PING, PONG};
pub use reader::FrameReader;
pub use writer::FrameWriter;
