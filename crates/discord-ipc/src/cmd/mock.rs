//! A scripted stand-in for the desktop client.
//!
//! Serves one client at a time: reads the handshake, answers with READY (or a
//! configured rejection), pushes `--emit` dispatch events, then echoes every
//! command frame back until the client leaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use discord_ipc_frame::{
    FrameError, FrameReader, FrameWriter, Message, CLOSE, FRAME, HANDSHAKE, PING, PONG,
};
use discord_ipc_session::INVALID_CLIENT_ID;
use discord_ipc_transport::{Endpoint, IpcStream};

use crate::cmd::MockArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

/// How long the Ctrl-C handler spends poking the listener awake.
const WAKE_TIMEOUT: Duration = Duration::from_millis(200);

/// Error code sent with `--reject-id` and `--error-event`.
const INVALID_CLIENT_ID_CODE: i64 = 4000;

pub fn run(args: MockArgs) -> CliResult<i32> {
    let listener = Listener::bind(&args.endpoint)?;
    info!(endpoint = %args.endpoint, "mock endpoint listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), Endpoint::native(args.endpoint.as_str()))?;

    let mut clients = 0u64;
    while running.load(Ordering::SeqCst) {
        let stream = listener.accept()?;
        if !running.load(Ordering::SeqCst) {
            break;
        }
        clients += 1;
        debug!(client = clients, transport = stream.transport_name(), "client attached");

        if let Err(err) = serve_client(stream, &args, clients) {
            warn!(client = clients, error = %err, "client session ended with an error");
        }
        if args.once {
            break;
        }
    }

    info!(clients, "mock endpoint shutting down");
    Ok(SUCCESS)
}

fn serve_client(stream: IpcStream, args: &MockArgs, client: u64) -> CliResult<()> {
    let read_half = stream
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(stream);

    let hello = match reader.read_message() {
        Ok(message) => message,
        Err(err) if err.is_clean_close() => {
            debug!(client, "client left before the handshake");
            return Ok(());
        }
        Err(err) => return Err(frame_error("handshake read failed", err)),
    };
    if hello.opcode != HANDSHAKE {
        warn!(client, opcode = hello.opcode, "first frame is not a handshake");
    }
    let client_id = hello
        .body
        .get("client_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(client, client_id = %client_id, v = ?hello.body.get("v"), "handshake received");

    if let Some(rejection) = rejection(args) {
        info!(client, reply = %rejection, "rejecting handshake");
        return writer
            .send_json(CLOSE, &rejection)
            .map_err(|err| frame_error("reply failed", err));
    }

    writer
        .send_json(FRAME, &ready_event())
        .map_err(|err| frame_error("reply failed", err))?;
    for seq in 0..args.emit {
        let event = json!({"cmd": "DISPATCH", "evt": "MOCK_EVENT", "data": {"seq": seq}});
        writer
            .send_json(FRAME, &event)
            .map_err(|err| frame_error("emit failed", err))?;
    }

    loop {
        let message = match reader.read_message() {
            Ok(message) => message,
            Err(err) if err.is_clean_close() => {
                info!(client, "client disconnected");
                return Ok(());
            }
            Err(FrameError::Malformed { opcode, source }) => {
                warn!(client, opcode, error = %source, "ignoring malformed frame");
                continue;
            }
            Err(err) => return Err(frame_error("read failed", err)),
        };

        match message.opcode {
            CLOSE => {
                info!(client, "client sent close");
                return Ok(());
            }
            PING => writer.send_json(PONG, &message.body),
            opcode => writer.send_json(opcode, &reply_to(&message, args)),
        }
        .map_err(|err| frame_error("reply failed", err))?;
    }
}

/// The handshake rejection configured on the command line, if any.
fn rejection(args: &MockArgs) -> Option<Value> {
    if args.reject_id {
        return Some(json!({"code": INVALID_CLIENT_ID_CODE, "message": INVALID_CLIENT_ID}));
    }
    args.error_code.map(|code| {
        let message = args.error_message.as_deref().unwrap_or("Rejected");
        json!({"code": code, "message": message})
    })
}

fn ready_event() -> Value {
    json!({
        "cmd": "DISPATCH",
        "evt": "READY",
        "data": {
            "v": 1,
            "config": {
                "cdn_host": "cdn.discordapp.com",
                "api_endpoint": "//discord.com/api",
                "environment": "production"
            },
            "user": {"id": "0", "username": "mock", "discriminator": "0"}
        },
        "nonce": null
    })
}

/// Echo the command back, or answer it with an ERROR event.
fn reply_to(message: &Message, args: &MockArgs) -> Value {
    match &args.error_event {
        Some(text) => json!({
            "cmd": message.body.get("cmd"),
            "evt": "ERROR",
            "nonce": message.body.get("nonce"),
            "data": {"code": INVALID_CLIENT_ID_CODE, "message": text}
        }),
        None => message.body.clone(),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, wake: Endpoint) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        // Unblock the pending accept; the loop sees the flag and exits.
        let _ = wake.connect(WAKE_TIMEOUT);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(unix)]
struct Listener(discord_ipc_transport::UnixDomainSocket);

#[cfg(unix)]
impl Listener {
    fn bind(endpoint: &str) -> CliResult<Self> {
        discord_ipc_transport::UnixDomainSocket::bind(endpoint)
            .map(Self)
            .map_err(|err| transport_error("bind failed", err))
    }

    fn accept(&self) -> CliResult<IpcStream> {
        self.0
            .accept()
            .map_err(|err| transport_error("accept failed", err))
    }
}

/// Named pipes have one instance per client, so each accept creates a fresh one.
#[cfg(windows)]
struct Listener(String);

#[cfg(windows)]
impl Listener {
    const ACCEPT_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

    fn bind(endpoint: &str) -> CliResult<Self> {
        Ok(Self(endpoint.to_string()))
    }

    fn accept(&self) -> CliResult<IpcStream> {
        discord_ipc_transport::NamedPipe::create(&self.0)
            .and_then(|pending| pending.wait(Self::ACCEPT_WAIT))
            .map_err(|err| transport_error("accept failed", err))
    }
}
