use std::sync::Arc;

use crate::cmd::{finish, parse_value, WriteArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    let value = parse_value(&args.value, args.as_type)?;
    tracing::debug!(param = %args.param, value = %value, "writing");

    let client = args.connect.connect(Arc::new(()))?;
    client
        .write(args.param.clone(), value)
        .map_err(|err| peer_error(&format!("write {} failed", args.param), err))?;
    finish(client)?;

    print_status("write", &args.param, format);
    Ok(SUCCESS)
}
