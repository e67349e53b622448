use std::sync::Arc;

use crate::cmd::{finish, SubscribeArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

/// Subscribe or unsubscribe each parameter in turn, stopping at the first failure.
///
/// The server drops a client's subscriptions when it disconnects, so a
/// one-shot subscribe mostly confirms the parameter can be subscribed.
pub fn run(args: SubscribeArgs, format: OutputFormat, subscribe: bool) -> CliResult<i32> {
    let operation = if subscribe { "subscribe" } else { "unsubscribe" };
    let client = args.connect.connect(Arc::new(()))?;
    for param in &args.params {
        let result = if subscribe {
            client.subscribe(param.clone())
        } else {
            client.unsubscribe(param.clone())
        };
        result.map_err(|err| peer_error(&format!("{operation} {param} failed"), err))?;
        print_status(operation, param, format);
    }
    finish(client)?;
    Ok(SUCCESS)
}
