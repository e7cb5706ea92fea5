use std::io::ErrorKind;
use std::time::Duration;

use discord_ipc_frame::FrameError;
use discord_ipc_transport::TransportError;

use crate::handshake::HandshakeState;
use crate::session::SessionState;

/// Errors surfaced by a [`Session`](crate::Session).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The endpoint could not be opened, or closed before the handshake reply.
    #[error("invalid pipe {endpoint}: {reason}")]
    InvalidPipe { endpoint: String, reason: String },

    /// The endpoint did not accept the connection in time.
    #[error("timed out after {timeout:?} connecting to {endpoint}")]
    ConnectionTimeout { endpoint: String, timeout: Duration },

    /// No endpoint could be resolved.
    #[error("could not find a Discord endpoint (is the client running?)")]
    DiscordNotFound,

    /// The server rejected the client id during the handshake.
    #[error("client id {client_id:?} was rejected")]
    InvalidId { client_id: String },

    /// The server rejected the handshake with an error record.
    #[error("discord error {code}: {message}")]
    DiscordError { code: i64, message: String },

    /// The server answered a request with an `ERROR` event.
    #[error("server error: {message}")]
    ServerError { message: String },

    /// The channel closed after the handshake.
    #[error("pipe closed ({received} of {expected} frame bytes transferred)")]
    PipeClosed { expected: usize, received: usize },

    /// A complete frame arrived whose body is not valid UTF-8 JSON.
    #[error("malformed frame (opcode {opcode}): {source}")]
    MalformedFrame {
        opcode: u32,
        #[source]
        source: serde_json::Error,
    },

    /// A payload could not be turned into a frame.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The operation requires a ready session.
    #[error("session is not connected (state: {state})")]
    NotConnected { state: SessionState },

    /// `connect` was called on a session that already left `Disconnected`.
    #[error("session cannot connect from state {state}")]
    AlreadyConnected { state: SessionState },

    /// A handshake step was driven out of order.
    #[error("handshake step out of order (state: {state:?})")]
    HandshakeOutOfOrder { state: HandshakeState },

    /// Any other OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for errors that leave the transport unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidPipe { .. }
                | SessionError::ConnectionTimeout { .. }
                | SessionError::InvalidId { .. }
                | SessionError::DiscordError { .. }
                | SessionError::PipeClosed { .. }
                | SessionError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Classify a failure to open `endpoint` within `timeout`.
pub(crate) fn connect_error(
    endpoint: &str,
    timeout: Duration,
    err: TransportError,
) -> SessionError {
    match err {
        TransportError::Timeout { .. } => SessionError::ConnectionTimeout {
            endpoint: endpoint.to_string(),
            timeout,
        },
        TransportError::Connect { source, .. } if source.kind() == ErrorKind::TimedOut => {
            SessionError::ConnectionTimeout {
                endpoint: endpoint.to_string(),
                timeout,
            }
        }
        TransportError::Io(io) => SessionError::Io(io),
        other => SessionError::InvalidPipe {
            endpoint: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Classify a frame failure during the handshake, where any close is an
/// unusable pipe.
pub(crate) fn handshake_error(endpoint: &str, err: FrameError) -> SessionError {
    match err {
        FrameError::ConnectionClosed { expected, received } => SessionError::InvalidPipe {
            endpoint: endpoint.to_string(),
            reason: format!(
                "closed during handshake ({received} of {expected} reply bytes received)"
            ),
        },
        other => stream_error(other),
    }
}

/// Classify a frame failure on a ready session.
pub(crate) fn stream_error(err: FrameError) -> SessionError {
    match err {
        FrameError::ConnectionClosed { expected, received } => {
            SessionError::PipeClosed { expected, received }
        }
        FrameError::Malformed { opcode, source } => {
            SessionError::MalformedFrame { opcode, source }
        }
        FrameError::Encode(source) => SessionError::InvalidPayload(source.to_string()),
        err @ FrameError::PayloadTooLarge { .. } => SessionError::InvalidPayload(err.to_string()),
        FrameError::Io(io) => SessionError::Io(io),
    }
}

/// Classify a transport failure outside of connect (cloning handles).
pub(crate) fn transport_error(err: TransportError) -> SessionError {
    stream_error(FrameError::from(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_connection_timeout() {
        let err = connect_error(
            "/tmp/discord-ipc-0",
            Duration::from_secs(30),
            TransportError::Timeout {
                endpoint: "/tmp/discord-ipc-0".into(),
                timeout: Duration::from_secs(30),
            },
        );
        assert!(matches!(
            err,
            SessionError::ConnectionTimeout { timeout, .. } if timeout == Duration::from_secs(30)
        ));
    }

    #[test]
    fn missing_endpoint_maps_to_invalid_pipe() {
        let err = connect_error(
            "/tmp/discord-ipc-0",
            Duration::from_secs(30),
            TransportError::Connect {
                endpoint: "/tmp/discord-ipc-0".into(),
                source: std::io::Error::from(ErrorKind::NotFound),
            },
        );
        assert!(matches!(err, SessionError::InvalidPipe { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn close_during_handshake_is_invalid_pipe() {
        let err = handshake_error(
            "memory:x",
            FrameError::ConnectionClosed {
                expected: 8,
                received: 3,
            },
        );
        assert!(matches!(err, SessionError::InvalidPipe { .. }));
    }

    #[test]
    fn close_after_handshake_is_pipe_closed() {
        let err = stream_error(FrameError::ConnectionClosed {
            expected: 8,
            received: 0,
        });
        assert!(matches!(
            err,
            SessionError::PipeClosed {
                expected: 8,
                received: 0
            }
        ));
    }

    #[test]
    fn malformed_is_not_fatal() {
        let source = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let err = stream_error(FrameError::Malformed { opcode: 1, source });
        assert!(matches!(err, SessionError::MalformedFrame { opcode: 1, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn closed_transport_maps_to_pipe_closed() {
        let err = transport_error(TransportError::PipeClosed {
            expected: 4,
            transferred: 1,
        });
        assert!(matches!(
            err,
            SessionError::PipeClosed {
                expected: 4,
                received: 1
            }
        ));
    }
}
