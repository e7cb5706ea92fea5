use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use discord_ipc_frame::{FrameReader, FrameWriter, Message};
use discord_ipc_transport::{Endpoint, IpcStream};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{connect_error, stream_error, transport_error, Result, SessionError};
use crate::handler::{ErrorHandler, FaultContext};
use crate::handshake::Handshake;
use crate::resolve::ResolveEndpoint;

/// Lifecycle of a [`Session`].
///
/// `Disconnected -> Connecting -> HandshakeSent -> Ready -> Closed`, with
/// `Faulted` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    HandshakeSent,
    Ready,
    Closed,
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::HandshakeSent => "handshake-sent",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

struct Channel {
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
}

#[derive(Default)]
struct CloseSlot {
    stream: Mutex<Option<IpcStream>>,
    requested: AtomicBool,
}

impl CloseSlot {
    fn install(&self, stream: IpcStream) {
        if let Ok(mut slot) = self.stream.lock() {
            if self.requested.load(Ordering::SeqCst) {
                stream.shutdown();
            }
            *slot = Some(stream);
        }
    }

    fn release(&self) {
        let stream = match self.stream.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(stream) = stream {
            stream.close();
        }
    }
}

/// Closes a [`Session`]'s transport from any thread.
///
/// A thread blocked in [`Session::receive`] wakes up with
/// [`SessionError::PipeClosed`] and the session ends in
/// [`SessionState::Closed`].
#[derive(Clone)]
pub struct SessionCloser {
    slot: Arc<CloseSlot>,
}

impl SessionCloser {
    /// Shut the transport down. Safe to call repeatedly and before connect.
    pub fn close(&self) {
        self.slot.requested.store(true, Ordering::SeqCst);
        self.slot.release();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.requested.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for SessionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A client connection to the local RPC endpoint.
///
/// Created inert; [`connect`](Self::connect) opens the transport and runs the
/// handshake. Frames can only be sent and received while
/// [`SessionState::Ready`]. Every call blocks the calling thread, and a
/// session is driven from one thread at a time.
pub struct Session {
    endpoint: Endpoint,
    config: SessionConfig,
    state: SessionState,
    channel: Option<Channel>,
    handshake_reply: Option<Value>,
    closer: SessionCloser,
    error_handler: Option<ErrorHandler>,
}

impl Session {
    /// Create a disconnected session for `endpoint`.
    pub fn new(endpoint: Endpoint, config: SessionConfig) -> Self {
        Self {
            endpoint,
            config,
            state: SessionState::Disconnected,
            channel: None,
            handshake_reply: None,
            closer: SessionCloser {
                slot: Arc::new(CloseSlot::default()),
            },
            error_handler: None,
        }
    }

    /// Create a disconnected session for whatever `resolver` finds.
    ///
    /// Returns [`SessionError::DiscordNotFound`] when nothing resolves.
    pub fn resolve<R>(resolver: &R, config: SessionConfig) -> Result<Self>
    where
        R: ResolveEndpoint + ?Sized,
    {
        let endpoint = resolver
            .resolve(config.pipe)
            .ok_or(SessionError::DiscordNotFound)?;
        Ok(Self::new(endpoint, config))
    }

    /// Install a callback that sees every error an operation returns.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&SessionError, &FaultContext) + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The body the server accepted the handshake with (usually `READY`).
    pub fn handshake_reply(&self) -> Option<&Value> {
        self.handshake_reply.as_ref()
    }

    /// A handle that can close this session from another thread.
    pub fn close_handle(&self) -> SessionCloser {
        self.closer.clone()
    }

    /// Open the transport and perform the handshake.
    ///
    /// On any failure the transport is released, the session is `Faulted`,
    /// and a new session is needed to try again.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::AlreadyConnected { state: self.state });
        }

        let label = self.endpoint.to_string();
        self.state = SessionState::Connecting;
        debug!(
            endpoint = %label,
            transport = self.endpoint.transport_name(),
            client_id = %self.config.client_id,
            "connecting"
        );

        match self.open_and_handshake(&label) {
            Ok(reply) => {
                self.handshake_reply = Some(reply);
                self.state = SessionState::Ready;
                debug!(endpoint = %label, "session ready");
                Ok(())
            }
            Err(err) => Err(self.fault("connect", err)),
        }
    }

    fn open_and_handshake(&mut self, label: &str) -> Result<Value> {
        let timeout = self.config.connection_timeout;
        let stream = self
            .endpoint
            .connect(timeout)
            .map_err(|err| connect_error(label, timeout, err))?;
        let reader_stream = stream.try_clone().map_err(transport_error)?;
        self.closer
            .slot
            .install(stream.try_clone().map_err(transport_error)?);

        let mut channel = Channel {
            reader: FrameReader::new(reader_stream),
            writer: FrameWriter::new(stream),
        };

        let mut handshake = Handshake::new(self.config.client_id.as_str(), label);
        handshake.send(&mut channel.writer)?;
        self.state = SessionState::HandshakeSent;
        let reply = handshake.receive(&mut channel.reader)?;

        self.channel = Some(channel);
        Ok(reply)
    }

    /// Serialize `payload` as JSON and send it under `opcode`.
    ///
    /// Fails with [`SessionError::NotConnected`] without touching the
    /// transport unless the session is ready.
    pub fn send<T: Serialize + ?Sized>(&mut self, opcode: u32, payload: &T) -> Result<()> {
        self.ensure_ready()?;
        let result = match self.channel.as_mut() {
            Some(channel) => channel
                .writer
                .send_json(opcode, payload)
                .map_err(stream_error),
            None => Err(SessionError::NotConnected { state: self.state }),
        };
        result.map_err(|err| self.fault("send", err))
    }

    /// Read the next frame.
    ///
    /// A body of the form `{"evt": "ERROR", "data": {"message": ..}}` is
    /// returned as [`SessionError::ServerError`]; the session stays ready.
    pub fn receive(&mut self) -> Result<Message> {
        self.ensure_ready()?;
        let result = match self.channel.as_mut() {
            Some(channel) => channel.reader.read_message().map_err(stream_error),
            None => Err(SessionError::NotConnected { state: self.state }),
        };
        let message = result.map_err(|err| self.fault("receive", err))?;

        if let Some(text) = server_error_message(&message.body) {
            let err = SessionError::ServerError { message: text };
            return Err(self.fault("receive", err));
        }

        trace!(opcode = message.opcode, body = %message.body, "received frame");
        Ok(message)
    }

    /// Send one frame and read the next one.
    pub fn request<T: Serialize + ?Sized>(
        &mut self,
        opcode: u32,
        payload: &T,
    ) -> Result<Message> {
        self.send(opcode, payload)?;
        self.receive()
    }

    /// Release the transport and move to `Closed`. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.release();
        debug!(endpoint = %self.endpoint, from = %self.state, "session closed");
        self.state = SessionState::Closed;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(SessionError::NotConnected { state: self.state })
        }
    }

    fn release(&mut self) {
        self.closer.slot.release();
        self.channel = None;
    }

    /// Record `err`: tear down on fatal errors, notify the handler, hand the
    /// error back.
    fn fault(&mut self, operation: &'static str, err: SessionError) -> SessionError {
        let state = self.state;
        let establishing = matches!(
            state,
            SessionState::Connecting | SessionState::HandshakeSent
        );

        if establishing || err.is_fatal() {
            self.release();
            self.state = if self.closer.is_closed() {
                SessionState::Closed
            } else {
                SessionState::Faulted
            };
            warn!(
                operation,
                from = %state,
                to = %self.state,
                endpoint = %self.endpoint,
                error = %err,
                "session fault"
            );
        }

        if let Some(handler) = self.error_handler.as_mut() {
            let context = FaultContext {
                operation,
                state,
                endpoint: self.endpoint.to_string(),
            };
            handler(&err, &context);
        }
        err
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.config.client_id)
            .field("state", &self.state)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

fn server_error_message(body: &Value) -> Option<String> {
    if body.get("evt").and_then(Value::as_str) != Some("ERROR") {
        return None;
    }
    let message = body
        .pointer("/data/message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(message.to_string())
}
