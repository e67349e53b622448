use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use opcmsg_codec::{
    CodecError, Event, Message, MessageType, Notification, ParamId, ParamValue, Status,
};
use opcmsg_frame::{hex, FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_BODY};
use opcmsg_transport::TransportError;
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};

/// Default port for the client role.
pub const DEFAULT_CLIENT_PORT: u16 = 4810;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Configuration for [`MessageClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host to connect to. Default: `127.0.0.1`.
    pub host: String,
    /// Port to connect to. Default: 4810.
    pub port: u16,
    /// Wait for one response before logging and retrying. Default: 500 ms.
    pub recv_timeout: Duration,
    /// Timed-out waits tolerated per request; `0` retries forever. Default: 0.
    pub retry_limit: u32,
    /// Bound on each background thread's shutdown acknowledgement. Default: 2 s.
    pub stop_timeout: Duration,
    /// How often background threads check for a stop request. Default: 100 ms.
    pub poll_interval: Duration,
    /// Largest accepted message body. Default: 16 MiB.
    pub max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CLIENT_PORT,
            recv_timeout: Duration::from_millis(500),
            retry_limit: 0,
            stop_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

impl ClientConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `host:port` as passed to connect.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Receives unsolicited messages from the server.
///
/// Each method runs on its own dispatcher thread, so a slow `notify` never
/// delays `event` or request/response traffic.
pub trait NotificationHandler: Send + Sync {
    fn notify(&self, _notification: Notification) {}

    fn event(&self, _event: Event) {}
}

/// Ignores everything.
impl NotificationHandler for () {}

type Slot = Sender<std::result::Result<Message, CodecError>>;

struct Shared {
    connected: AtomicBool,
    /// One-shot slots of in-flight requests, keyed by correlation id.
    pending: Mutex<HashMap<u32, Slot>>,
}

impl Shared {
    fn register(&self, correlation_id: u32) -> Result<Receiver<std::result::Result<Message, CodecError>>> {
        let mut pending = lock(&self.pending);
        if !self.connected.load(Ordering::Acquire) {
            return Err(PeerError::Disconnected("not connected".to_string()));
        }
        let (slot, waiter) = channel::bounded(1);
        if pending.insert(correlation_id, slot).is_some() {
            warn!(correlation_id, "correlation id reused while in flight");
        }
        Ok(waiter)
    }

    fn forget(&self, correlation_id: u32) {
        lock(&self.pending).remove(&correlation_id);
    }

    fn complete(&self, correlation_id: u32, outcome: std::result::Result<Message, CodecError>) {
        match lock(&self.pending).remove(&correlation_id) {
            Some(slot) => {
                let _ = slot.send(outcome);
            }
            None => debug!(correlation_id, "no request waiting, dropping response"),
        }
    }

    /// Mark disconnected and fail every waiter.
    fn close(&self) {
        let mut pending = lock(&self.pending);
        self.connected.store(false, Ordering::Release);
        pending.clear();
    }
}

/// A background thread with a cooperative stop flag and a bounded
/// acknowledgement.
struct Worker {
    name: &'static str,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    /// Taken once the thread has been joined.
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let (ack, done) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name(format!("opcmsg-{name}"))
            .spawn(move || {
                body(&flag);
                let _ = ack.send(());
            })?;
        Ok(Self {
            name,
            stop,
            done,
            handle: Some(handle),
        })
    }

    fn signal(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Signal the thread and join it once it acknowledges. After a timeout
    /// the handle is kept, so a later call can retry.
    fn stop(&mut self, timeout: Duration) -> Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.signal();
        match self.done.recv_timeout(timeout) {
            // A dropped acknowledgement means the thread already ended.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!(thread = self.name, "background thread panicked");
                    }
                }
                debug!(thread = self.name, "stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(PeerError::ShutdownFailed(format!(
                "{} thread did not stop within {timeout:?}",
                self.name
            ))),
        }
    }
}

struct Workers {
    receiver: Worker,
    notify: Worker,
    event: Worker,
}

impl Workers {
    /// Receiver first, then the Notify and Event dispatchers. Stops at the
    /// first thread that does not acknowledge; threads already joined stay
    /// joined on a retry.
    fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.receiver.stop(timeout)?;
        self.notify.stop(timeout)?;
        self.event.stop(timeout)
    }
}

/// Client side of the protocol.
///
/// Requests are correlated to responses through per-request slots keyed by
/// correlation id, so any number of threads may call [`send_message`] or
/// the typed operations concurrently. Notifications and Events are handed
/// to the [`NotificationHandler`] from two dedicated dispatcher threads.
///
/// [`send_message`]: MessageClient::send_message
pub struct MessageClient {
    config: ClientConfig,
    peer: SocketAddr,
    shared: Arc<Shared>,
    writer: Mutex<FrameWriter<TcpStream>>,
    next_id: AtomicU32,
    workers: Mutex<Option<Workers>>,
}

impl MessageClient {
    /// Connect and start the Receiver, Notify and Event threads.
    pub fn connect(config: ClientConfig, handler: Arc<dyn NotificationHandler>) -> Result<Self> {
        let addr = config.addr();
        let stream = TcpStream::connect(addr.as_str()).map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true).map_err(TransportError::from)?;
        let peer = stream.peer_addr().map_err(TransportError::from)?;
        let read_half = stream.try_clone().map_err(TransportError::from)?;

        let frame_config = FrameConfig {
            max_body_size: config.max_body_size,
            read_timeout: Some(config.poll_interval),
            write_timeout: None,
        };
        let reader = FrameReader::with_config_tcp(read_half, frame_config.clone())?;
        let writer = FrameWriter::with_config(stream, frame_config);

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
        });

        let workers = match spawn_workers(reader, &shared, handler, config.poll_interval) {
            Ok(workers) => workers,
            Err(err) => {
                shared.close();
                let _ = writer.get_ref().shutdown(Shutdown::Both);
                return Err(TransportError::from(err).into());
            }
        };

        info!(peer = %peer, "connected");
        Ok(Self {
            config,
            peer,
            shared,
            writer: Mutex::new(writer),
            next_id: AtomicU32::new(1),
            workers: Mutex::new(Some(workers)),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// False once the server closed the connection or after [`disconnect`](Self::disconnect).
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Next correlation id of this session.
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write `message` and wait for the response carrying its correlation id.
    ///
    /// Each receive window that passes without a response is logged and
    /// retried, forever when the retry limit is `0`.
    pub fn send_message(&self, message: &Message) -> Result<Message> {
        let id = message.correlation_id();
        let waiter = self.shared.register(id)?;

        let written = lock(&self.writer).write_message(message);
        if let Err(err) = written {
            self.shared.forget(id);
            return Err(err.into());
        }
        trace!(message = %message, "request sent");

        let timeout = self.config.recv_timeout;
        let limit = self.config.retry_limit;
        let mut retries = 0u32;
        loop {
            match waiter.recv_timeout(timeout) {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => return Err(err.into()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PeerError::Disconnected(format!(
                        "connection closed while waiting for response {id}"
                    )));
                }
                Err(RecvTimeoutError::Timeout) if limit == 0 || retries < limit => {
                    retries += 1;
                    debug!(correlation_id = id, retries, ?timeout, "no response yet, retrying");
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.shared.forget(id);
                    return Err(PeerError::Timeout { retries, timeout });
                }
            }
        }
    }

    pub fn read(&self, param_id: ParamId) -> Result<ParamValue> {
        let request = Message::read(self.next_id(), param_id);
        match self.send_message(&request)? {
            Message::ReadResponse(response) => {
                check(response.status)?;
                response
                    .result
                    .map(|r| r.value)
                    .ok_or(PeerError::Status(Status::MissingField))
            }
            other => Err(unexpected(MessageType::ReadResponse, &other)),
        }
    }

    pub fn write(&self, param_id: ParamId, value: ParamValue) -> Result<()> {
        let request = Message::write(self.next_id(), param_id, value);
        match self.send_message(&request)? {
            Message::WriteResponse(response) => check(response.status),
            other => Err(unexpected(MessageType::WriteResponse, &other)),
        }
    }

    pub fn subscribe(&self, param_id: ParamId) -> Result<()> {
        let request = Message::subscribe(self.next_id(), param_id);
        match self.send_message(&request)? {
            Message::SubscribeResponse(response) => check(response.status),
            other => Err(unexpected(MessageType::SubscribeResponse, &other)),
        }
    }

    pub fn unsubscribe(&self, param_id: ParamId) -> Result<()> {
        let request = Message::unsubscribe(self.next_id(), param_id);
        match self.send_message(&request)? {
            Message::UnsubscribeResponse(response) => check(response.status),
            other => Err(unexpected(MessageType::UnsubscribeResponse, &other)),
        }
    }

    /// Invoke a method. An `ApplicationError` response becomes
    /// [`PeerError::Application`].
    pub fn call(
        &self,
        method_id: ParamId,
        param_id: ParamId,
        args: Vec<ParamValue>,
    ) -> Result<Vec<ParamValue>> {
        let request = Message::call(self.next_id(), method_id, param_id, args);
        let response = match self.send_message(&request)? {
            Message::CallResponse(response) => response,
            other => return Err(unexpected(MessageType::CallResponse, &other)),
        };
        let values = response.result.map(|r| r.values).unwrap_or_default();
        match response.status {
            Status::Success => Ok(values),
            Status::ApplicationError => Err(application_error(&values)),
            status => Err(PeerError::Status(status)),
        }
    }

    /// Stop the Receiver, then the Notify and Event dispatchers, each within
    /// the stop timeout, and close the socket.
    ///
    /// Idempotent. A thread that does not acknowledge in time is reported as
    /// [`PeerError::ShutdownFailed`] and the socket is left open; calling
    /// again resumes with the threads not yet stopped.
    pub fn disconnect(&self) -> Result<()> {
        let mut workers = lock(&self.workers);
        let Some(running) = workers.as_mut() else {
            return Ok(());
        };
        info!(peer = %self.peer, "disconnecting");
        running.stop(self.config.stop_timeout)?;
        *workers = None;
        drop(workers);

        self.shared.close();
        match lock(&self.writer).get_ref().shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotConnected => {}
            Err(err) => return Err(TransportError::from(err).into()),
        }
        debug!(peer = %self.peer, "disconnected");
        Ok(())
    }
}

impl Drop for MessageClient {
    fn drop(&mut self) {
        if let Err(err) = self.disconnect() {
            warn!(error = %err, "disconnect on drop failed");
        }
    }
}

fn spawn_workers(
    reader: FrameReader<TcpStream>,
    shared: &Arc<Shared>,
    handler: Arc<dyn NotificationHandler>,
    poll_interval: Duration,
) -> std::io::Result<Workers> {
    let (notify_tx, notify_rx) = channel::unbounded();
    let (event_tx, event_rx) = channel::unbounded();

    let receiver_shared = Arc::clone(shared);
    let receiver = Worker::spawn("receiver", move |stop| {
        receive_loop(reader, &receiver_shared, &notify_tx, &event_tx, stop);
    })?;

    let notify_handler = Arc::clone(&handler);
    let notify = match Worker::spawn("notify", move |stop| {
        dispatch_loop(&notify_rx, poll_interval, stop, |n| notify_handler.notify(n));
    }) {
        Ok(worker) => worker,
        Err(err) => {
            receiver.signal();
            return Err(err);
        }
    };

    let event = match Worker::spawn("event", move |stop| {
        dispatch_loop(&event_rx, poll_interval, stop, |e| handler.event(e));
    }) {
        Ok(worker) => worker,
        Err(err) => {
            receiver.signal();
            notify.signal();
            return Err(err);
        }
    };

    Ok(Workers {
        receiver,
        notify,
        event,
    })
}

/// Read frames until stopped or the stream ends, routing responses to their
/// slots and unsolicited messages to the dispatchers.
fn receive_loop(
    mut reader: FrameReader<TcpStream>,
    shared: &Shared,
    notifications: &Sender<Notification>,
    events: &Sender<Event>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Acquire) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "discarding malformed frame");
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                info!("connection closed by server");
                break;
            }
            Err(err) => {
                warn!(error = %err, "receive failed");
                break;
            }
        };

        let header = frame.header;
        let message = match frame.decode() {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    message_type = %header.message_type,
                    correlation_id = header.correlation_id,
                    body = %hex(&frame.body),
                    error = %err,
                    "failed to decode message"
                );
                if let (FrameError::Codec(codec), true) = (err, header.message_type.is_response()) {
                    shared.complete(header.correlation_id, Err(codec));
                }
                continue;
            }
        };
        trace!(message = %message, "received");

        match message {
            Message::Notification(notification) => {
                let _ = notifications.send(notification);
            }
            Message::Event(event) => {
                let _ = events.send(event);
            }
            response => shared.complete(header.correlation_id, Ok(response)),
        }
    }
    shared.close();
    debug!("receiver finished");
}

fn dispatch_loop<T>(
    queue: &Receiver<T>,
    poll_interval: Duration,
    stop: &AtomicBool,
    mut deliver: impl FnMut(T),
) {
    while !stop.load(Ordering::Acquire) {
        match queue.recv_timeout(poll_interval) {
            Ok(item) => deliver(item),
            Err(RecvTimeoutError::Timeout) => continue,
            // The receiver has finished and the queue is drained.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn check(status: Status) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(PeerError::Status(status))
    }
}

fn unexpected(expected: MessageType, actual: &Message) -> PeerError {
    PeerError::UnexpectedResponse {
        expected,
        actual: actual.message_type(),
    }
}

/// Decode `[Int(code), String(message)]` from an `ApplicationError` result.
fn application_error(values: &[ParamValue]) -> PeerError {
    let code = values
        .first()
        .and_then(ParamValue::as_i64)
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or_default();
    let message = values
        .get(1)
        .and_then(ParamValue::as_str)
        .unwrap_or_default()
        .to_string();
    PeerError::Application { code, message }
}
