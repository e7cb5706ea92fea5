use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FrameError, Result};

/// Frame header: opcode (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// The fixed binary header in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u32,
    pub length: u32,
}

impl FrameHeader {
    /// Unpack a header from its wire bytes.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        let opcode = buf.get_u32_le();
        let length = buf.get_u32_le();
        Self { opcode, length }
    }

    /// Pack the header into its wire bytes.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.opcode.to_le_bytes());
        out[4..].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

/// A raw frame: opcode plus undecoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The opcode this frame was sent with.
    pub opcode: u32,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(opcode: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Build a frame whose payload is `value` serialized as JSON.
    pub fn from_json<T: Serialize + ?Sized>(opcode: u32, value: &T) -> Result<Self> {
        let payload = serde_json::to_vec(value).map_err(FrameError::Encode)?;
        Ok(Self::new(opcode, payload))
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Deserialize the payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(|source| FrameError::Malformed {
            opcode: self.opcode,
            source,
        })
    }

    /// Decode the payload into a [`Message`].
    pub fn into_message(self) -> Result<Message> {
        let body = self.json()?;
        Ok(Message {
            opcode: self.opcode,
            body,
        })
    }
}

/// A decoded frame: opcode plus parsed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub opcode: u32,
    pub body: serde_json::Value,
}

impl Message {
    /// Create a message from an opcode and JSON body.
    pub fn new(opcode: u32, body: serde_json::Value) -> Self {
        Self { opcode, body }
    }

    /// Deserialize the body into a concrete type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|source| FrameError::Malformed {
            opcode: self.opcode,
            source,
        })
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Opcode       │ Length       │ Payload          │
/// │ (4B LE u32)  │ (4B LE u32)  │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(opcode: u32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(opcode);
    dst.put_u32_le(length);
    dst.put_slice(payload);
    Ok(())
}

/// Serialize `value` as JSON and encode it as a frame.
///
/// Key order and omitted fields are whatever `value`'s `Serialize` produces.
pub fn encode_json<T: Serialize + ?Sized>(
    opcode: u32,
    value: &T,
    dst: &mut BytesMut,
) -> Result<()> {
    let payload = serde_json::to_vec(value).map_err(FrameError::Encode)?;
    encode_frame(opcode, &payload, dst)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. The length field is
/// not checked against any maximum.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let header = FrameHeader::parse(&header);
    let payload_len = usize::try_from(header.length).map_err(|_| FrameError::PayloadTooLarge {
        size: usize::MAX,
        max: usize::MAX,
    })?;

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        opcode: header.opcode,
        payload,
    }))
}
