use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use opcmsg_codec::{Event, Notification};
use opcmsg_peer::NotificationHandler;

use crate::cmd::{finish, install_ctrlc_handler, WatchArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_event, print_notification, OutputFormat};

const TICK: Duration = Duration::from_millis(100);

enum Push {
    Notification(Notification),
    Event(Event),
}

/// Forwards pushes from the client's dispatcher threads to the printing loop.
struct Forwarder(Sender<Push>);

impl NotificationHandler for Forwarder {
    fn notify(&self, notification: Notification) {
        let _ = self.0.send(Push::Notification(notification));
    }

    fn event(&self, event: Event) {
        let _ = self.0.send(Push::Event(event));
    }
}

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let (tx, rx) = channel::unbounded();
    let client = args.connect.connect(Arc::new(Forwarder(tx)))?;

    for param in &args.params {
        client
            .subscribe(param.clone())
            .map_err(|err| peer_error(&format!("subscribe {param} failed"), err))?;
        tracing::info!(param = %param, "subscribed");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(TICK) {
            Ok(Push::Notification(notification)) => print_notification(&notification, format),
            Ok(Push::Event(event)) => print_event(&event, format),
            Err(RecvTimeoutError::Timeout) => {
                if !client.is_connected() {
                    return Err(CliError::new(FAILURE, "server closed the connection"));
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    // Best effort; the server drops subscriptions on disconnect anyway.
    for param in &args.params {
        if let Err(err) = client.unsubscribe(param.clone()) {
            tracing::debug!(param = %param, error = %err, "unsubscribe failed");
        }
    }
    finish(client)?;
    Ok(SUCCESS)
}
