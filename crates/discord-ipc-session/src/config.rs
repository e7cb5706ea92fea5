use std::time::Duration;

/// Default bound on opening the transport.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default response timeout. Stored for callers; reads are not bounded by it.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings a [`Session`](crate::Session) is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Application id sent in the handshake.
    pub client_id: String,
    /// Upper bound on acquiring the transport.
    pub connection_timeout: Duration,
    /// Accepted and exposed, but not enforced on reads.
    pub response_timeout: Duration,
    /// Pipe discriminator handed to endpoint resolution (`discord-ipc-{n}`).
    pub pipe: Option<u32>,
}

impl SessionConfig {
    /// Configuration for `client_id` with default timeouts.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            pipe: None,
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_pipe(mut self, pipe: u32) -> Self {
        self.pipe = Some(pipe);
        self
    }
}
