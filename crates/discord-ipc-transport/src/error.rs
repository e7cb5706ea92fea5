use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create or bind the specified endpoint.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The endpoint did not accept the connection within the timeout.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The channel was closed by either side.
    ///
    /// `transferred` counts the bytes moved before the close was observed.
    #[error("pipe closed ({transferred} of {expected} bytes transferred)")]
    PipeClosed { expected: usize, transferred: usize },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// A pending wait for a peer was cancelled before a peer attached.
    #[error("wait for peer on {0} was cancelled")]
    Cancelled(String),
}

impl TransportError {
    /// True when the error reports a closed channel rather than an OS fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::PipeClosed { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
