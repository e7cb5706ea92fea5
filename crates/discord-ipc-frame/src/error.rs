use discord_ipc_transport::TransportError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload could not be serialized to JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A complete frame arrived but its body is not valid UTF-8 JSON.
    #[error("malformed frame (opcode {opcode}): {source}")]
    Malformed {
        opcode: u32,
        #[source]
        source: serde_json::Error,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was transferred.
    #[error("connection closed ({received} of {expected} frame bytes transferred)")]
    ConnectionClosed { expected: usize, received: usize },
}

impl FrameError {
    /// True when the peer closed the channel on a frame boundary.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed { received: 0, .. })
    }
}

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PipeClosed {
                expected,
                transferred,
            } => FrameError::ConnectionClosed {
                expected,
                received: transferred,
            },
            TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                FrameError::Io(source)
            }
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
