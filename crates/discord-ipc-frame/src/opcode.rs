//! Well-known opcodes.
//!
//! Opcode 0 opens every connection. The framing layer and the session never
//! look at any other opcode; the names below exist for callers and
//! diagnostics.

/// Handshake request and reply.
pub const HANDSHAKE: u32 = 0;

/// Command/response and event traffic after the handshake.
pub const FRAME: u32 = 1;

/// Either side is closing the connection.
pub const CLOSE: u32 = 2;

/// Keep-alive request.
pub const PING: u32 = 3;

/// Keep-alive response.
pub const PONG: u32 = 4;

/// Returns a human-readable name for an opcode.
pub fn opcode_name(opcode: u32) -> &'static str {
    match opcode {
        HANDSHAKE => "HANDSHAKE",
        FRAME => "FRAME",
        CLOSE => "CLOSE",
        PING => "PING",
        PONG => "PONG",
        _ => "UNKNOWN",
    }
}
