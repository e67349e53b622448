use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use opcmsg_codec::{from_json, ParamId, ParamValue};
use opcmsg_peer::{ClientConfig, MessageClient, NotificationHandler, DEFAULT_CLIENT_PORT};
use opcmsg_transport::DEFAULT_SERVER_PORT;

use crate::exit::{peer_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod call;
pub mod read;
pub mod serve;
pub mod subscribe;
pub mod version;
pub mod watch;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve parameters from an in-memory provider.
    Serve(ServeArgs),
    /// Read one parameter.
    Read(ReadArgs),
    /// Write one parameter.
    Write(WriteArgs),
    /// Subscribe to parameters.
    Subscribe(SubscribeArgs),
    /// Cancel subscriptions.
    Unsubscribe(SubscribeArgs),
    /// Invoke a method.
    Call(CallArgs),
    /// Subscribe and print notifications and events as they arrive.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Read(args) => read::run(args, format),
        Command::Write(args) => write::run(args, format),
        Command::Subscribe(args) => subscribe::run(args, format, true),
        Command::Unsubscribe(args) => subscribe::run(args, format, false),
        Command::Call(args) => call::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// Port to listen on.
    #[arg(long, short = 'p', env = "OPCMSG_PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,
    /// Preload demo parameters and methods.
    #[arg(long)]
    pub demo: bool,
    /// Period between notifications for subscribed parameters (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
}

/// Where and how patiently to reach the server.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Server host.
    #[arg(long, env = "OPCMSG_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', env = "OPCMSG_PORT", default_value_t = DEFAULT_CLIENT_PORT)]
    pub port: u16,
    /// Receive window per attempt, in milliseconds.
    #[arg(
        long,
        env = "OPCMSG_RECV_TIMEOUT_MS",
        default_value_t = 500,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub recv_timeout_ms: u64,
    /// Receive windows to retry before giving up; 0 waits forever.
    #[arg(long, env = "OPCMSG_RETRY_LIMIT", default_value_t = 4)]
    pub retry_limit: u32,
}

impl ConnectArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_host(self.host.clone())
            .with_port(self.port)
            .with_recv_timeout(Duration::from_millis(self.recv_timeout_ms))
            .with_retry_limit(self.retry_limit)
    }

    pub fn connect(&self, handler: Arc<dyn NotificationHandler>) -> CliResult<MessageClient> {
        MessageClient::connect(self.client_config(), handler)
            .map_err(|err| peer_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Parameter id (e.g. "ns=2;s=speed", "ns=0;i=2258").
    pub param: ParamId,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Parameter id.
    pub param: ParamId,
    /// Value as JSON (e.g. 42, 1.5, true, "text", [1,2], {"@id":"ns=2;s=T","x":1}).
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    /// Wire type for a numeric value; JSON integers are sent as int or long otherwise.
    #[arg(long = "as", value_name = "TYPE")]
    pub as_type: Option<ScalarType>,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Parameter ids.
    #[arg(required = true)]
    pub params: Vec<ParamId>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Method id.
    pub method: ParamId,
    /// Parameter the method is invoked on.
    pub param: ParamId,
    /// Arguments as JSON values. Negative numbers are accepted; pass other
    /// values starting with `-` after `--`.
    #[arg(num_args = 0.., allow_negative_numbers = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Parameter ids.
    #[arg(required = true)]
    pub params: Vec<ParamId>,
    /// Exit after printing N notifications or events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScalarType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ScalarType {
    fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// Parse a JSON command-line value, optionally narrowing a number to `as_type`.
pub fn parse_value(text: &str, as_type: Option<ScalarType>) -> CliResult<ParamValue> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| CliError::usage(format!("invalid JSON value {text:?}: {err}")))?;
    let value =
        from_json(&json).map_err(|err| CliError::usage(format!("unsupported value {text}: {err}")))?;
    match as_type {
        None => Ok(value),
        Some(ty) => coerce(value, ty),
    }
}

fn coerce(value: ParamValue, ty: ScalarType) -> CliResult<ParamValue> {
    let out_of_range = |int: i64| CliError::usage(format!("{int} does not fit in {}", ty.name()));
    if let Some(int) = value.as_i64() {
        return match ty {
            ScalarType::Byte => u8::try_from(int).map(ParamValue::Byte).map_err(|_| out_of_range(int)),
            ScalarType::Short => i16::try_from(int).map(ParamValue::Short).map_err(|_| out_of_range(int)),
            ScalarType::Int => i32::try_from(int).map(ParamValue::Int).map_err(|_| out_of_range(int)),
            ScalarType::Long => Ok(ParamValue::Long(int)),
            ScalarType::Float => Ok(ParamValue::Float(int as f32)),
            ScalarType::Double => Ok(ParamValue::Double(int as f64)),
        };
    }
    match (value.as_f64(), ty) {
        (Some(float), ScalarType::Float) => Ok(ParamValue::Float(float as f32)),
        (Some(float), ScalarType::Double) => Ok(ParamValue::Double(float)),
        _ => Err(CliError::usage(format!(
            "cannot send {} value as {}",
            value.type_name(),
            ty.name()
        ))),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
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
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Disconnect and map a failed shutdown to an exit code.
pub fn finish(client: MessageClient) -> CliResult<()> {
    client
        .disconnect()
        .map_err(|err| peer_error("disconnect failed", err))
}
