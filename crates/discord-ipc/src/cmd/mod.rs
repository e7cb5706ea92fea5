use clap::{Args, Subcommand};
use std::time::Duration;

use discord_ipc_session::{Session, SessionConfig};
use discord_ipc_transport::Endpoint;

use crate::exit::{session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod handshake;
pub mod listen;
pub mod mock;
pub mod send;
pub mod version;

/// Settings shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    pub client_id: Option<String>,
    pub format: OutputFormat,
}

impl Context {
    fn require_client_id(&self) -> CliResult<&str> {
        match self.client_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(CliError::new(
                USAGE,
                "a client id is required (--client-id or DISCORD_CLIENT_ID)",
            )),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect, handshake, and print the server's ready payload.
    Handshake(HandshakeArgs),
    /// Send one frame on an established session.
    Send(SendArgs),
    /// Print frames pushed by the server.
    Listen(ListenArgs),
    /// Serve a scripted stand-in for the desktop client.
    Mock(MockArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, context: &Context) -> CliResult<i32> {
    match command {
        Command::Handshake(args) => handshake::run(args, context),
        Command::Send(args) => send::run(args, context),
        Command::Listen(args) => listen::run(args, context),
        Command::Mock(args) => mock::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Socket path (Unix) or pipe name (Windows) to connect to.
    pub endpoint: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct HandshakeArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Opcode to send with.
    #[arg(long, default_value = "1")]
    pub opcode: u32,
    /// JSON payload.
    #[arg(long)]
    pub json: String,
    /// Drop null members (and objects left empty) before sending.
    #[arg(long)]
    pub strip_nulls: bool,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MockArgs {
    /// Socket path (Unix) or pipe name (Windows) to serve on.
    pub endpoint: String,
    /// Reject every handshake as an unknown client id.
    #[arg(long, conflicts_with = "error_code")]
    pub reject_id: bool,
    /// Reject every handshake with this error code.
    #[arg(long, value_name = "CODE")]
    pub error_code: Option<i64>,
    /// Message sent with --error-code.
    #[arg(long, value_name = "MSG", requires = "error_code")]
    pub error_message: Option<String>,
    /// Answer every command with an ERROR event carrying this message.
    #[arg(long, value_name = "MSG")]
    pub error_event: Option<String>,
    /// Push N dispatch events right after the handshake.
    #[arg(long, value_name = "N", default_value = "0")]
    pub emit: usize,
    /// Exit after the first client disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect and handshake a session for `args`.
fn open_session(args: &ConnectArgs, context: &Context) -> CliResult<Session> {
    let config = SessionConfig::new(context.require_client_id()?)
        .with_connection_timeout(parse_duration(&args.timeout)?);
    let mut session = Session::new(Endpoint::native(args.endpoint.as_str()), config);
    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;
    Ok(session)
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
