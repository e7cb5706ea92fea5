//! Blocking duplex transport for the Discord local RPC channel.
//!
//! Provides a unified interface over different local transport mechanisms:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows)
//! - In-memory pipes served by an injectable [`PipeBroker`]
//!
//! This is the lowest layer of discord-ipc. Everything else builds on top of
//! the [`IpcStream`] type provided here: [`Endpoint::connect`] opens one,
//! [`exact::read_exact`] and [`exact::write_all`] move whole buffers over it,
//! and [`IpcStream::close`] releases it.

pub mod endpoint;
pub mod error;
pub mod exact;
pub mod memory;
pub mod traits;
pub mod wait;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use memory::{MemoryPipeListener, PipeBroker, DEFAULT_PIPE_CAPACITY};
pub use traits::IpcStream;
pub use wait::PendingPeer;

#[cfg(windows)]
pub use pipe::NamedPipe;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
