use std::sync::Arc;

use crate::cmd::{finish, parse_value, CallArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_call, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let values = args
        .args
        .iter()
        .map(|text| parse_value(text, None))
        .collect::<CliResult<Vec<_>>>()?;

    let client = args.connect.connect(Arc::new(()))?;
    let results = client
        .call(args.method.clone(), args.param.clone(), values)
        .map_err(|err| peer_error(&format!("call {} failed", args.method), err))?;
    finish(client)?;

    print_call(&args.method, &args.param, &results, format);
    Ok(SUCCESS)
}
