//! Handshake and session management for the Discord local RPC channel.
//!
//! This is the layer applications use. Resolve or name an endpoint, create a
//! [`Session`] with a client id, `connect`, then exchange JSON frames until
//! the session is closed or faults.
//!
//! ```no_run
//! use discord_ipc_session::{Session, SessionConfig};
//! use discord_ipc_transport::Endpoint;
//!
//! # fn main() -> discord_ipc_session::Result<()> {
//! let endpoint = Endpoint::native("/run/user/1000/discord-ipc-0");
//! let mut session = Session::new(endpoint, SessionConfig::new("123456789012345678"));
//! session.connect()?;
//! let reply = session.request(1, &serde_json::json!({"cmd": "GET_GUILDS", "nonce": "1"}))?;
//! println!("{}", reply.body);
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod payload;
pub mod resolve;
pub mod session;

pub use config::{SessionConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT};
pub use error::{Result, SessionError};
pub use handler::{ErrorHandler, FaultContext};
pub use handshake::{
    Handshake, HandshakeReply, HandshakeRequest, HandshakeState, INVALID_CLIENT_ID, RPC_VERSION,
};
pub use payload::remove_none;
pub use resolve::{ResolveEndpoint, ResolveFn};
pub use session::{Session, SessionCloser, SessionState};
