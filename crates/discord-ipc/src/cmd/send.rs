use serde_json::Value;
use tracing::debug;

use discord_ipc_session::remove_none;

use crate::cmd::{open_session, Context, SendArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_message;

pub fn run(args: SendArgs, context: &Context) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let mut session = open_session(&args.connect, context)?;
    let endpoint = session.endpoint().to_string();

    session
        .send(args.opcode, &payload)
        .map_err(|err| session_error("send failed", err))?;
    debug!(opcode = args.opcode, "payload sent");

    if args.wait {
        let message = session
            .receive()
            .map_err(|err| session_error("receive failed", err))?;
        print_message(&message, &endpoint, context.format);
    }

    session.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    let mut payload: Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
    if args.strip_nulls {
        remove_none(&mut payload);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cmd::ConnectArgs;

    fn args(json: &str, strip_nulls: bool) -> SendArgs {
        SendArgs {
            connect: ConnectArgs {
                endpoint: "/tmp/discord-ipc-0".into(),
                timeout: "1s".into(),
            },
            opcode: 1,
            json: json.into(),
            strip_nulls,
            wait: false,
        }
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let err = resolve_payload(&args("{nope", false)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn strip_nulls_is_applied_before_sending() {
        let raw = r#"{"cmd":"SET_ACTIVITY","args":{"state":null},"nonce":"1"}"#;

        let kept = resolve_payload(&args(raw, false)).unwrap();
        assert_eq!(kept["args"], json!({"state": null}));

        let stripped = resolve_payload(&args(raw, true)).unwrap();
        assert_eq!(stripped, json!({"cmd": "SET_ACTIVITY", "nonce": "1"}));
    }
}
