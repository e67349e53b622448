use std::sync::Arc;

use crate::cmd::{finish, ReadArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let client = args.connect.connect(Arc::new(()))?;
    let value = client
        .read(args.param.clone())
        .map_err(|err| peer_error(&format!("read {} failed", args.param), err))?;
    finish(client)?;

    print_value(&args.param, &value, format);
    Ok(SUCCESS)
}
