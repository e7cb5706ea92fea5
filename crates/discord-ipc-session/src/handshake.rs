use std::io::{Read, Write};

use discord_ipc_frame::{FrameReader, FrameWriter, HANDSHAKE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{handshake_error, Result, SessionError};

/// RPC protocol version sent in every handshake.
pub const RPC_VERSION: u32 = 1;

/// The server message that marks a rejected client id.
pub const INVALID_CLIENT_ID: &str = "Invalid Client ID";

/// Opening request, sent on the handshake opcode.
///
/// Serializes as `{"v":1,"client_id":"..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub v: u32,
    pub client_id: String,
}

impl HandshakeRequest {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: RPC_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// Progress of one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Sent,
    Accepted,
    Rejected,
}

/// How the server answered the opening request.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeReply {
    /// No `code` member: the body is the server's welcome (usually READY).
    Accepted(Value),
    /// `code` present with the exact message `"Invalid Client ID"`.
    InvalidId,
    /// `code` present with any other message.
    Rejected { code: i64, message: String },
}

impl HandshakeReply {
    /// Classify a reply body.
    ///
    /// `code` is read as a whole number whether it arrives as an integer, a
    /// whole float, or a numeric string; values past `i64` saturate and
    /// anything else is reported as 0. A missing `message` is an empty
    /// string. The presence of `code` alone decides rejection.
    pub fn classify(body: Value) -> Self {
        if body.get("code").is_none() {
            return HandshakeReply::Accepted(body);
        }
        let code = body.get("code").map(error_code).unwrap_or_default();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if message == INVALID_CLIENT_ID {
            HandshakeReply::InvalidId
        } else {
            HandshakeReply::Rejected {
                code,
                message: message.to_string(),
            }
        }
    }
}

fn error_code(value: &Value) -> i64 {
    match value {
        Value::Number(n) => {
            if let Some(code) = n.as_i64() {
                code
            } else if n.as_u64().is_some() {
                i64::MAX
            } else {
                n.as_f64().map(whole_number).unwrap_or_default()
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(whole_number))
            .unwrap_or_default(),
        _ => 0,
    }
}

/// `f` as an integer when it has no fractional part, else 0.
fn whole_number(f: f64) -> i64 {
    if f.is_finite() && f.fract() == 0.0 {
        // `as` saturates at the i64 bounds.
        f as i64
    } else {
        0
    }
}

/// The opening exchange: `Idle -> Sent -> Accepted | Rejected`.
///
/// Exactly one request is written and exactly one reply frame is read.
/// Rejection is final for the attempt.
#[derive(Debug)]
pub struct Handshake {
    request: HandshakeRequest,
    endpoint: String,
    state: HandshakeState,
}

impl Handshake {
    /// Prepare a handshake for `client_id` against the endpoint named
    /// `endpoint` (used in errors and logs).
    pub fn new(client_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            request: HandshakeRequest::new(client_id),
            endpoint: endpoint.into(),
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn request(&self) -> &HandshakeRequest {
        &self.request
    }

    /// Write the opening request. Only valid from `Idle`.
    pub fn send<W: Write>(&mut self, writer: &mut FrameWriter<W>) -> Result<()> {
        if self.state != HandshakeState::Idle {
            return Err(SessionError::HandshakeOutOfOrder { state: self.state });
        }

        writer
            .send_json(HANDSHAKE, &self.request)
            .map_err(|err| handshake_error(&self.endpoint, err))?;
        self.state = HandshakeState::Sent;
        debug!(client_id = %self.request.client_id, endpoint = %self.endpoint, "handshake sent");
        Ok(())
    }

    /// Read and classify the single reply. Only valid from `Sent`.
    ///
    /// Returns the accepted reply body.
    pub fn receive<R: Read>(&mut self, reader: &mut FrameReader<R>) -> Result<Value> {
        if self.state != HandshakeState::Sent {
            return Err(SessionError::HandshakeOutOfOrder { state: self.state });
        }

        let message = reader
            .read_message()
            .map_err(|err| handshake_error(&self.endpoint, err))?;
        debug!(opcode = message.opcode, endpoint = %self.endpoint, "handshake reply");

        match HandshakeReply::classify(message.body) {
            HandshakeReply::Accepted(body) => {
                self.state = HandshakeState::Accepted;
                Ok(body)
            }
            HandshakeReply::InvalidId => {
                self.state = HandshakeState::Rejected;
                Err(SessionError::InvalidId {
                    client_id: self.request.client_id.clone(),
                })
            }
            HandshakeReply::Rejected { code, message } => {
                self.state = HandshakeState::Rejected;
                Err(SessionError::DiscordError { code, message })
            }
        }
    }

    /// Send the request and read the reply.
    pub fn run<R: Read, W: Write>(
        &mut self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> Result<Value> {
        self.send(writer)?;
        self.receive(reader)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;

    /// Encode replies into bytes readable by a `FrameReader`.
    fn wire(frames: &[(u32, Value)]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        for (opcode, body) in frames {
            writer.send_json(*opcode, body).unwrap();
        }
        writer.into_inner()
    }

    fn run_against(reply: Vec<u8>) -> (Handshake, Result<Value>, Vec<u8>) {
        let mut handshake = Handshake::new("1234", "memory:test");
        let mut reader = FrameReader::new(Cursor::new(reply));
        let mut writer = FrameWriter::new(Vec::new());
        let result = handshake.run(&mut reader, &mut writer);
        (handshake, result, writer.into_inner())
    }

    #[test]
    fn request_wire_bytes() {
        let (_, _, sent) = run_against(wire(&[(1, json!({"v": 1}))]));
        let body = br#"{"v":1,"client_id":"1234"}"#;
        assert_eq!(&sent[..4], &[0, 0, 0, 0]);
        assert_eq!(&sent[4..8], &(body.len() as u32).to_le_bytes());
        assert_eq!(&sent[8..], body);
    }

    #[test]
    fn reply_without_code_is_accepted() {
        let (handshake, result, _) = run_against(wire(&[(1, json!({"v": 1}))]));
        assert_eq!(result.unwrap(), json!({"v": 1}));
        assert_eq!(handshake.state(), HandshakeState::Accepted);
    }

    #[test]
    fn invalid_client_id_rejected() {
        let reply = json!({"code": 4000, "message": "Invalid Client ID"});
        let (handshake, result, _) = run_against(wire(&[(2, reply)]));
        assert!(matches!(
            result,
            Err(SessionError::InvalidId { ref client_id }) if client_id == "1234"
        ));
        assert_eq!(handshake.state(), HandshakeState::Rejected);
    }

    #[test]
    fn other_error_code_is_discord_error() {
        let reply = json!({"code": 4001, "message": "Something else"});
        let (handshake, result, _) = run_against(wire(&[(2, reply)]));
        assert!(matches!(
            result,
            Err(SessionError::DiscordError { code: 4001, ref message }) if message == "Something else"
        ));
        assert_eq!(handshake.state(), HandshakeState::Rejected);
    }

    #[test]
    fn message_match_is_exact() {
        let reply = json!({"code": 4000, "message": "invalid client id"});
        assert_eq!(
            HandshakeReply::classify(reply),
            HandshakeReply::Rejected {
                code: 4000,
                message: "invalid client id".to_string()
            }
        );
    }

    #[test]
    fn code_without_message_is_rejected() {
        assert_eq!(
            HandshakeReply::classify(json!({"code": 1000})),
            HandshakeReply::Rejected {
                code: 1000,
                message: String::new()
            }
        );
    }

    #[test]
    fn loosely_typed_codes_keep_their_value() {
        let rejected = |code: Value| {
            let reply = json!({"code": code, "message": "x"});
            match HandshakeReply::classify(reply) {
                HandshakeReply::Rejected { code, .. } => code,
                other => panic!("unexpected reply: {other:?}"),
            }
        };
        assert_eq!(rejected(json!(4000.0)), 4000);
        assert_eq!(rejected(json!("4001")), 4001);
        assert_eq!(rejected(json!(u64::MAX)), i64::MAX);
        assert_eq!(rejected(json!(-5)), -5);
        assert_eq!(rejected(json!(4000.5)), 0);
        assert_eq!(rejected(json!("soon")), 0);
        assert_eq!(rejected(json!(null)), 0);
    }

    #[test]
    fn short_header_is_invalid_pipe() {
        let (handshake, result, _) = run_against(vec![1, 0, 0, 0, 2]);
        assert!(matches!(result, Err(SessionError::InvalidPipe { .. })));
        assert_eq!(handshake.state(), HandshakeState::Sent);
    }

    #[test]
    fn empty_reply_is_invalid_pipe() {
        let (_, result, _) = run_against(Vec::new());
        assert!(matches!(result, Err(SessionError::InvalidPipe { .. })));
    }

    #[test]
    fn malformed_reply() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.send(1, b"{oops").unwrap();
        let (_, result, _) = run_against(writer.into_inner());
        assert!(matches!(result, Err(SessionError::MalformedFrame { .. })));
    }

    #[test]
    fn steps_must_run_in_order() {
        let mut handshake = Handshake::new("1234", "memory:test");
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let err = handshake.receive(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            SessionError::HandshakeOutOfOrder {
                state: HandshakeState::Idle
            }
        ));

        let mut writer = FrameWriter::new(Vec::new());
        handshake.send(&mut writer).unwrap();
        let err = handshake.send(&mut writer).unwrap_err();
        assert!(matches!(
            err,
            SessionError::HandshakeOutOfOrder {
                state: HandshakeState::Sent
            }
        ));
    }

    #[test]
    #[cfg(unix)]
    fn handshake_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();

        let server = std::thread::spawn(move || {
            let mut reader = FrameReader::new(left.try_clone().unwrap());
            let mut writer = FrameWriter::new(left);
            let request = reader.read_message().unwrap();
            assert_eq!(request.opcode, HANDSHAKE);
            let request: HandshakeRequest = request.parse().unwrap();
            writer
                .send_json(1, &json!({"cmd": "DISPATCH", "evt": "READY"}))
                .unwrap();
            request
        });

        let mut reader = FrameReader::new(right.try_clone().unwrap());
        let mut writer = FrameWriter::new(right);
        let mut handshake = Handshake::new("5678", "pair");
        let reply = handshake.run(&mut reader, &mut writer).unwrap();

        assert_eq!(reply["evt"], "READY");
        assert_eq!(server.join().unwrap(), HandshakeRequest::new("5678"));
    }
}
