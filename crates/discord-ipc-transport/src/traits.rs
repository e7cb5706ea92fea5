use std::io::{Read, Write};

use tracing::debug;

use crate::error::Result;
use crate::exact;
use crate::memory::MemoryStream;

/// A connected IPC stream implementing `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix, this wraps a Unix domain socket stream.
/// On Windows, this wraps a named pipe handle.
/// On every platform it may also wrap a broker-backed in-memory pipe.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    Pipe(std::fs::File),
    Memory(MemoryStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.read(buf),
            IpcStreamInner::Memory(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.write(buf),
            IpcStreamInner::Memory(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => file.flush(),
            IpcStreamInner::Memory(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Create an IpcStream from an opened named pipe handle.
    #[cfg(windows)]
    pub(crate) fn from_pipe(file: std::fs::File) -> Self {
        Self {
            inner: IpcStreamInner::Pipe(file),
        }
    }

    pub(crate) fn from_memory(stream: MemoryStream) -> Self {
        Self {
            inner: IpcStreamInner::Memory(stream),
        }
    }

    /// Read exactly `buf.len()` bytes.
    pub fn read_exact_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        exact::read_exact(self, buf)
    }

    /// Write all of `data`, accumulating partial writes.
    pub fn write_all_bytes(&mut self, data: &[u8]) -> Result<()> {
        exact::write_all(self, data)
    }

    /// Try to clone this stream (creates a new handle to the same channel).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_unix(cloned))
            }
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => {
                let cloned = file.try_clone()?;
                Ok(Self::from_pipe(cloned))
            }
            IpcStreamInner::Memory(stream) => Ok(Self::from_memory(stream.clone())),
        }
    }

    /// Shut the channel down for every handle sharing it.
    ///
    /// Threads blocked in a read on a clone of this stream wake up and
    /// observe end-of-stream. Faults are swallowed; shutdown is best-effort
    /// and may be called any number of times.
    pub fn shutdown(&self) {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                if let Err(err) = stream.shutdown(std::net::Shutdown::Both) {
                    if err.kind() != std::io::ErrorKind::NotConnected {
                        tracing::warn!(error = %err, "socket shutdown failed");
                    }
                }
            }
            #[cfg(windows)]
            IpcStreamInner::Pipe(file) => crate::pipe::cancel_pending_io(file),
            IpcStreamInner::Memory(stream) => stream.close(),
        }
    }

    /// Shut the channel down and release this handle.
    pub fn close(self) {
        debug!(transport = self.transport_name(), "closing stream");
        self.shutdown();
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix-domain-socket",
            #[cfg(windows)]
            IpcStreamInner::Pipe(_) => "named-pipe",
            IpcStreamInner::Memory(_) => "memory-pipe",
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
