//! Exact-length read and write loops.
//!
//! The underlying primitives may move fewer bytes than asked for. These
//! helpers accumulate partial transfers so callers never observe short reads
//! or short writes.

use std::io::{self, ErrorKind, Read, Write};

use crate::error::{Result, TransportError};

/// Fill `buf` completely from `reader` (blocking).
///
/// A zero-length read before `buf` is full means the peer closed the channel
/// and yields [`TransportError::PipeClosed`].
pub fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(TransportError::PipeClosed {
                    expected: buf.len(),
                    transferred: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_closed_error(&err) => {
                return Err(TransportError::PipeClosed {
                    expected: buf.len(),
                    transferred: filled,
                })
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(())
}

/// Write all of `data` to `writer` and flush (blocking).
///
/// A write that accepts zero bytes is treated as a closed channel.
pub fn write_all<W: Write + ?Sized>(writer: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match writer.write(&data[offset..]) {
            Ok(0) => {
                return Err(TransportError::PipeClosed {
                    expected: data.len(),
                    transferred: offset,
                })
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_closed_error(&err) => {
                return Err(TransportError::PipeClosed {
                    expected: data.len(),
                    transferred: offset,
                })
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_closed_error(&err) => {
                return Err(TransportError::PipeClosed {
                    expected: data.len(),
                    transferred: offset,
                })
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

/// ReadFile/WriteFile fail with this once `CancelIoEx` aborts them.
#[cfg(windows)]
const ERROR_OPERATION_ABORTED: i32 = 995;

/// OS errors that mean the channel is gone: the peer went away, or a local
/// shutdown cancelled the blocked call.
pub(crate) fn is_closed_error(err: &io::Error) -> bool {
    cancelled_by_shutdown(err)
        || matches!(
            err.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        )
}

#[cfg(windows)]
fn cancelled_by_shutdown(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ERROR_OPERATION_ABORTED)
}

#[cfg(not(windows))]
fn cancelled_by_shutdown(_err: &io::Error) -> bool {
    false
}
