use std::io::Write;

use bytes::BytesMut;
use discord_ipc_transport::exact;
use serde::Serialize;
use tracing::trace;

use crate::codec::{encode_frame, encode_json, Frame, HEADER_SIZE};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Header and payload are assembled into one buffer and handed to the stream
/// in a single write-all, so a frame is either fully sent or reported failed.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.opcode, frame.payload.as_ref())
    }

    /// Encode and send a raw payload under `opcode`.
    pub fn send(&mut self, opcode: u32, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(opcode, payload, &mut self.buf)?;
        self.flush_buffer(opcode)
    }

    /// Serialize `value` as JSON and send it under `opcode`.
    pub fn send_json<V: Serialize + ?Sized>(&mut self, opcode: u32, value: &V) -> Result<()> {
        self.buf.clear();
        encode_json(opcode, value, &mut self.buf)?;
        self.flush_buffer(opcode)
    }

    fn flush_buffer(&mut self, opcode: u32) -> Result<()> {
        exact::write_all(&mut self.inner, &self.buf)?;
        trace!(opcode, len = self.buf.len() - HEADER_SIZE, "wrote frame");
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
