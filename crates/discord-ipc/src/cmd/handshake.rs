use serde_json::Value;

use crate::cmd::{open_session, Context, HandshakeArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::print_handshake;

pub fn run(args: HandshakeArgs, context: &Context) -> CliResult<i32> {
    let mut session = open_session(&args.connect, context)?;
    let endpoint = session.endpoint().to_string();

    let reply = session.handshake_reply().cloned().unwrap_or(Value::Null);
    print_handshake(&reply, &endpoint, context.format);

    session.close();
    Ok(SUCCESS)
}
