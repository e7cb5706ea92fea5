//! Client for the Discord local RPC channel.
//!
//! Connects to the desktop client over a Unix domain socket or a Windows
//! named pipe, performs the opening handshake, and exchanges opcode-tagged
//! JSON frames.
//!
//! # Crate Structure
//!
//! - [`transport`]: blocking duplex streams (UDS, named pipes, in-memory pipes)
//! - [`frame`]: opcode + length-prefixed JSON framing
//! - [`session`]: handshake and session lifecycle (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use discord_ipc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use discord_ipc_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use discord_ipc_session::*;
}
