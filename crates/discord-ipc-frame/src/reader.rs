use std::io::Read;

use bytes::BytesMut;
use discord_ipc_transport::{exact, TransportError};
use tracing::trace;

use crate::codec::{Frame, FrameHeader, Message, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Payload bytes requested per read while filling a large frame.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Each frame is read with exact-length reads: the 8 header bytes, then
/// exactly `length` payload bytes. Nothing past the current frame is ever
/// consumed, and callers never see a partial frame.
pub struct FrameReader<T> {
    inner: T,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read the next frame header (blocking).
    pub fn read_header(&mut self) -> Result<FrameHeader> {
        let mut header = [0u8; HEADER_SIZE];
        exact::read_exact(&mut self.inner, &mut header)?;
        Ok(FrameHeader::parse(&header))
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let header = self.read_header()?;
        let length = usize::try_from(header.length).map_err(|_| FrameError::PayloadTooLarge {
            size: usize::MAX,
            max: usize::MAX,
        })?;

        // Grow as bytes arrive rather than trusting the length up front.
        let mut payload = BytesMut::with_capacity(length.min(READ_CHUNK_SIZE));
        while payload.len() < length {
            let start = payload.len();
            let chunk = (length - start).min(READ_CHUNK_SIZE);
            payload.resize(start + chunk, 0);
            exact::read_exact(&mut self.inner, &mut payload[start..]).map_err(|err| {
                match err {
                    TransportError::PipeClosed { transferred, .. } => {
                        FrameError::ConnectionClosed {
                            expected: HEADER_SIZE + length,
                            received: HEADER_SIZE + start + transferred,
                        }
                    }
                    other => FrameError::from(other),
                }
            })?;
        }

        trace!(opcode = header.opcode, len = length, "read frame");
        Ok(Frame {
            opcode: header.opcode,
            payload: payload.freeze(),
        })
    }

    /// Read the next frame and parse its body as JSON (blocking).
    pub fn read_message(&mut self) -> Result<Message> {
        self.read_frame()?.into_message()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use bytes::{BufMut, BytesMut};
    use serde_json::json;

    use super::*;
    use crate::codec::{encode_frame, encode_json};

    #[test]
    fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(1, b"{\"evt\":\"READY\"}", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.opcode, 1);
        assert_eq!(frame.payload.as_ref(), b"{\"evt\":\"READY\"}");
    }

    #[test]
    fn read_multiple_frames_without_overreading() {
        let mut wire = BytesMut::new();
        encode_frame(0, b"{}", &mut wire).unwrap();
        encode_frame(1, b"[1]", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let f1 = reader.read_frame().unwrap();
        assert_eq!(
            reader.get_ref().position() as usize,
            HEADER_SIZE + 2,
            "reader must stop at the frame boundary"
        );
        let f2 = reader.read_frame().unwrap();

        assert_eq!((f1.opcode, f1.payload.as_ref()), (0, b"{}".as_ref()));
        assert_eq!((f2.opcode, f2.payload.as_ref()), (1, b"[1]".as_ref()));
    }

    #[test]
    fn read_message_parses_json() {
        let body = json!({"cmd": "DISPATCH", "data": {"v": 1}});
        let mut wire = BytesMut::new();
        encode_json(1, &body, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let message = reader.read_message().unwrap();
        assert_eq!(message.opcode, 1);
        assert_eq!(message.body, body);
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![b'a'; 3 * READ_CHUNK_SIZE + 17];
        let mut wire = BytesMut::new();
        encode_frame(9, &payload, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().unwrap();

        assert_eq!(frame.opcode, 9);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_json(4, &json!({"slow": true}), &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let message = reader.read_message().unwrap();
        assert_eq!(message.opcode, 4);
        assert_eq!(message.body, json!({"slow": true}));
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_clean_close());
    }

    #[test]
    fn connection_closed_mid_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![1u8, 0, 0]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::ConnectionClosed {
                expected: HEADER_SIZE,
                received: 3
            }
        ));
        assert!(!err.is_clean_close());
    }

    #[test]
    fn connection_closed_mid_payload() {
        let mut partial = BytesMut::new();
        partial.put_u32_le(1);
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::ConnectionClosed {
                expected: 24,
                received: 17
            }
        ));
    }

    #[test]
    fn huge_length_does_not_preallocate() {
        let mut wire = BytesMut::new();
        wire.put_u32_le(1);
        wire.put_u32_le(u32::MAX);
        wire.put_slice(b"{}");

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed { .. }));
    }

    #[test]
    fn malformed_json_is_distinct_from_close() {
        let mut wire = BytesMut::new();
        encode_frame(1, b"{not-json", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Malformed { opcode: 1, .. }));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let mut wire = BytesMut::new();
        encode_frame(7, b"{}", &mut wire).unwrap();

        let reader = ErrorThenData {
            error: Some(ErrorKind::WouldBlock),
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(8, b"{}", &mut wire).unwrap();

        let reader = ErrorThenData {
            error: Some(ErrorKind::Interrupted),
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().unwrap();

        assert_eq!(frame.opcode, 8);
        assert_eq!(frame.payload.as_ref(), b"{}");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send_json(1, &json!({"cmd": "PING"})).unwrap();
        let message = reader.read_message().unwrap();

        assert_eq!(message.opcode, 1);
        assert_eq!(message.body, json!({"cmd": "PING"}));
    }

    #[test]
    #[cfg(unix)]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u32 {
                let message = reader.read_message().unwrap();
                assert_eq!(message.opcode, expected % 5);
                assert_eq!(message.body, json!({ "seq": expected }));
            }
        });

        for i in 0..64u32 {
            writer.send_json(i % 5, &json!({ "seq": i })).unwrap();
        }

        reader_thread.join().unwrap();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct ErrorThenData {
        error: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ErrorThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.error.take() {
                return Err(std::io::Error::from(kind));
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
