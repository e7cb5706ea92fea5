use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::memory::PipeBroker;
use crate::traits::IpcStream;

/// A resolved place to connect to.
///
/// Endpoints come from whatever discovers the desktop application; this crate
/// never searches for them. The variant picks the backend.
#[derive(Clone)]
pub enum Endpoint {
    /// Filesystem path of a Unix domain socket.
    #[cfg(unix)]
    UnixSocket(PathBuf),
    /// Full path of a Windows named pipe (`\\.\pipe\...`).
    #[cfg(windows)]
    NamedPipe(String),
    /// A pipe registered with an in-memory broker.
    Memory {
        broker: Arc<PipeBroker>,
        name: String,
    },
}

impl Endpoint {
    /// The native endpoint for `path` on this platform.
    #[cfg(unix)]
    pub fn native(path: impl Into<String>) -> Self {
        Endpoint::UnixSocket(PathBuf::from(path.into()))
    }

    /// The native endpoint for `path` on this platform.
    #[cfg(windows)]
    pub fn native(path: impl Into<String>) -> Self {
        Endpoint::NamedPipe(crate::pipe::NamedPipe::path_for(&path.into()))
    }

    /// An endpoint served by `broker`.
    pub fn memory(broker: &Arc<PipeBroker>, name: impl Into<String>) -> Self {
        Endpoint::Memory {
            broker: Arc::clone(broker),
            name: name.into(),
        }
    }

    /// Open a stream to this endpoint, giving up after `timeout`.
    pub fn connect(&self, timeout: Duration) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            Endpoint::UnixSocket(path) => crate::uds::UnixDomainSocket::connect(path, timeout),
            #[cfg(windows)]
            Endpoint::NamedPipe(path) => crate::pipe::NamedPipe::connect(path, timeout),
            Endpoint::Memory { broker, name } => broker.connect(name, timeout),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Endpoint::UnixSocket(_) => "unix-domain-socket",
            #[cfg(windows)]
            Endpoint::NamedPipe(_) => "named-pipe",
            Endpoint::Memory { .. } => "memory-pipe",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::UnixSocket(path) => write!(f, "{}", path.display()),
            #[cfg(windows)]
            Endpoint::NamedPipe(path) => f.write_str(path),
            Endpoint::Memory { name, .. } => write!(f, "memory:{name}"),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("transport", &self.transport_name())
            .field("address", &self.to_string())
            .finish()
    }
}
