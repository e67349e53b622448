use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Prefix shared by the targets of every protocol crate and the binary.
const PROTOCOL_TARGET: &str = "opcmsg";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    fn is_verbose(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }
}

/// Protocol crates log at `level`; everything else only from warn up.
fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_target(PROTOCOL_TARGET, level)
        .with_default(level.min(LevelFilter::WARN))
}

/// Send logs to stderr so stdout carries only command output.
///
/// Lines carry the thread name (`opcmsg-server`, `opcmsg-calls`,
/// `opcmsg-receiver`, ...) so server and client threads can be told apart;
/// at debug and trace the emitting module is shown too.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(level.is_verbose())
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(targets(level));

    let _ = match format {
        LogFormat::Text => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn protocol_crates_follow_the_requested_level() {
        let filter = targets(LogLevel::Debug);
        assert!(filter.would_enable("opcmsg_peer::client", &Level::DEBUG));
        assert!(filter.would_enable("opcmsg", &Level::DEBUG));
        assert!(!filter.would_enable("opcmsg_transport::server", &Level::TRACE));
    }

    #[test]
    fn other_targets_are_capped_at_warn() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("ctrlc", &Level::WARN));
        assert!(!filter.would_enable("ctrlc", &Level::INFO));

        let quiet = targets(LogLevel::Error);
        assert!(!quiet.would_enable("ctrlc", &Level::WARN));
        assert!(quiet.would_enable("opcmsg_codec", &Level::ERROR));
    }
}
