use crate::cmd::ServeArgs;
use crate::exit::CliResult;

#[cfg(not(unix))]
pub fn run(_args: ServeArgs) -> CliResult<i32> {
    Err(crate::exit::CliError::usage(
        "serve requires a unix platform",
    ))
}

#[cfg(unix)]
pub fn run(args: ServeArgs) -> CliResult<i32> {
    unix::run(args)
}

#[cfg(unix)]
mod unix {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use opcmsg_codec::{ParamArray, ParamId, ParamValue, Struct};
    use opcmsg_peer::{MemoryProvider, MessageHandler, ProviderError};
    use opcmsg_transport::{MessageServer, ServerConfig};
    use tracing::{debug, info};

    use super::ServeArgs;
    use crate::cmd::{install_ctrlc_handler, parse_duration};
    use crate::exit::{peer_error, transport_error, CliResult, SUCCESS};

    const TICK: Duration = Duration::from_millis(100);
    const DEMO_NAMESPACE: i32 = 2;
    /// The demo counter raises an event every this many increments.
    const COUNTER_EVENT_EVERY: i32 = 10;

    pub(super) fn demo_id(name: &str) -> ParamId {
        ParamId::string(DEMO_NAMESPACE, name)
    }

    pub(super) fn demo_provider() -> MemoryProvider {
        MemoryProvider::new()
            .with_value(demo_id("counter"), ParamValue::Int(0))
            .with_value(demo_id("speed"), ParamValue::Double(12.5))
            .with_value(demo_id("label"), "demo")
            .with_value(demo_id("enabled"), true)
            .with_value(demo_id("samples"), ParamArray::Int(vec![1, 2, 3]))
            .with_value(
                demo_id("motor"),
                Struct::new(demo_id("MotorType"))
                    .with_field("name", "m1")
                    .with_field("rpm", ParamValue::Int(1500)),
            )
            .with_method(demo_id("add"), |_, args| {
                args.iter().try_fold(0i64, |sum, arg| {
                    let n = arg
                        .as_i64()
                        .ok_or_else(|| ProviderError::invalid(format!("not an integer: {arg}")))?;
                    sum.checked_add(n)
                        .ok_or_else(|| ProviderError::invalid("sum overflows"))
                })
                .map(|sum| vec![ParamValue::Long(sum)])
            })
            .with_method(demo_id("echo"), |_, args| Ok(args))
            .with_method(demo_id("fail"), |_, args| {
                let message = args
                    .first()
                    .and_then(ParamValue::as_str)
                    .unwrap_or("requested failure");
                Err(ProviderError::application(0x100, message))
            })
    }

    pub(super) fn run(args: ServeArgs) -> CliResult<i32> {
        let interval = parse_duration(&args.interval)?;
        let provider = Arc::new(if args.demo {
            demo_provider()
        } else {
            MemoryProvider::new()
        });

        let config = ServerConfig::default()
            .with_host(args.bind.clone())
            .with_port(args.port);
        let server = MessageServer::new(config).map_err(|err| transport_error("server setup failed", err))?;
        let handler = Arc::new(
            MessageHandler::new(Arc::clone(&provider), server.outbound())
                .map_err(|err| peer_error("handler setup failed", err))?,
        );
        let addr = server
            .start(handler.clone())
            .map_err(|err| transport_error("start failed", err))?;
        info!(addr = %addr, demo = args.demo, "serving");

        let running = Arc::new(AtomicBool::new(true));
        install_ctrlc_handler(running.clone())?;

        let mut next = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && server.is_running() {
            let now = Instant::now();
            if now < next {
                thread::sleep(TICK.min(next - now));
                continue;
            }
            next += interval;
            if args.demo {
                advance_counter(&handler, &provider);
            }
            publish(&handler, &provider);
        }

        info!("shutting down");
        server.stop();
        Ok(SUCCESS)
    }

    fn advance_counter(handler: &MessageHandler<MemoryProvider>, provider: &MemoryProvider) {
        let counter = demo_id("counter");
        let next = match provider.get(&counter) {
            Some(ParamValue::Int(n)) => n.wrapping_add(1),
            _ => 0,
        };
        provider.set(counter.clone(), ParamValue::Int(next));

        if next % COUNTER_EVENT_EVERY == 0 && provider.is_subscribed(&counter) {
            let sent = handler.event(
                demo_id("CounterEvent"),
                counter,
                100,
                format!("counter reached {next}"),
                vec![],
            );
            if let Err(err) = sent {
                debug!(error = %err, "event not sent");
            }
        }
    }

    /// Push the current value of every subscribed parameter in one Notification.
    fn publish(handler: &MessageHandler<MemoryProvider>, provider: &MemoryProvider) {
        let mut subscribed = provider.subscriptions();
        if subscribed.is_empty() {
            return;
        }
        subscribed.sort_by_key(ToString::to_string);
        let params: Vec<_> = subscribed
            .into_iter()
            .filter_map(|id| provider.get(&id).map(|value| (id, value)))
            .collect();
        if let Err(err) = handler.notify(params) {
            debug!(error = %err, "notification not sent");
        }
    }

}
