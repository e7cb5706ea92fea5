use tracing::{info, warn};

use discord_ipc_session::{SessionCloser, SessionError};

use crate::cmd::{open_session, Context, ListenArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::print_message;

pub fn run(args: ListenArgs, context: &Context) -> CliResult<i32> {
    let mut session = open_session(&args.connect, context)?;
    let endpoint = session.endpoint().to_string();

    let closer = session.close_handle();
    install_ctrlc_handler(closer.clone())?;

    let mut printed = 0usize;
    while !count_reached(printed, args.count) {
        let message = match session.receive() {
            Ok(message) => message,
            Err(_) if closer.is_closed() => {
                info!(endpoint = %endpoint, "interrupted, closing session");
                break;
            }
            Err(err @ (SessionError::ServerError { .. } | SessionError::MalformedFrame { .. })) => {
                warn!(endpoint = %endpoint, error = %err, "skipping frame");
                continue;
            }
            Err(err) => return Err(session_error("receive failed", err)),
        };

        print_message(&message, &endpoint, context.format);
        printed = printed.saturating_add(1);
    }

    session.close();
    Ok(SUCCESS)
}

fn count_reached(printed: usize, count: Option<usize>) -> bool {
    count.is_some_and(|count| printed >= count)
}

fn install_ctrlc_handler(closer: SessionCloser) -> CliResult<()> {
    ctrlc::set_handler(move || closer.close()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
