use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use opcmsg_codec::Message;
use opcmsg_frame::{hex, MessageFramer};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{Result, TransportError};
use crate::listener::MessageListener;
use crate::poll::{PollSet, Waker, READABLE, WRITABLE};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long the listening socket is left out of the poll set after a
/// failed accept (e.g. EMFILE), while it still reports readable.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct PendingWrite {
    buf: Bytes,
    written: usize,
}

/// The served peer and its pending writes, guarded together so a teardown
/// can never leave a buffer queued for the next client.
#[derive(Default)]
struct Outgoing {
    peer: Option<SocketAddr>,
    queue: VecDeque<PendingWrite>,
}

struct Shared {
    running: AtomicBool,
    outgoing: Mutex<Outgoing>,
    waker: Waker,
}

impl Shared {
    fn submit(&self, bytes: Bytes) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(TransportError::NotRunning);
        }
        {
            let mut outgoing = lock(&self.outgoing);
            if outgoing.peer.is_none() {
                return Err(TransportError::NotConnected);
            }
            outgoing.queue.push_back(PendingWrite {
                buf: bytes,
                written: 0,
            });
        }
        self.waker.wake();
        Ok(())
    }

    fn submit_message(&self, message: &Message) -> Result<()> {
        let bytes = message.serialize()?;
        debug!(
            message_type = %message.message_type(),
            correlation_id = message.correlation_id(),
            len = bytes.len(),
            "queue message"
        );
        self.submit(bytes)
    }

    fn has_pending_writes(&self) -> bool {
        !lock(&self.outgoing).queue.is_empty()
    }
}

/// Cloneable handle for queueing outbound messages on a [`MessageServer`].
///
/// Handed to application code (usually the listener itself) before the
/// server starts.
#[derive(Clone)]
pub struct Outbound {
    shared: Arc<Shared>,
}

impl Outbound {
    /// Queue an already serialized message.
    pub fn submit(&self, bytes: Bytes) -> Result<()> {
        self.shared.submit(bytes)
    }

    /// Serialize and queue a message.
    pub fn submit_message(&self, message: &Message) -> Result<()> {
        self.shared.submit_message(message)
    }

    /// Whether a client is currently being served.
    pub fn is_connected(&self) -> bool {
        lock(&self.shared.outgoing).peer.is_some()
    }
}

struct Running {
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

/// TCP server that serves exactly one client at a time.
///
/// A dedicated thread owns the listening socket, the client socket and the
/// `poll(2)` registration. Inbound bytes go to a per-connection framing
/// worker which reassembles frames and calls
/// [`MessageListener::received`]. A second connection arriving while a
/// client is served is accepted, closed at once and reported via
/// [`MessageListener::rejected`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use opcmsg_codec::MessageHeader;
/// use opcmsg_transport::{MessageListener, MessageServer, ServerConfig};
///
/// struct Print;
///
/// impl MessageListener for Print {
///     fn received(&self, header: &MessageHeader, body: &[u8]) {
///         println!("{} ({} body bytes)", header.message_type, body.len());
///     }
/// }
///
/// let server = MessageServer::new(ServerConfig::default())?;
/// let addr = server.start(Arc::new(Print))?;
/// println!("listening on {addr}");
/// server.stop();
/// # Ok::<(), opcmsg_transport::TransportError>(())
/// ```
pub struct MessageServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl MessageServer {
    /// Create a stopped server.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            outgoing: Mutex::new(Outgoing::default()),
            waker: Waker::new()?,
        });
        Ok(Self {
            config,
            shared,
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// A handle for queueing outbound messages from other threads.
    pub fn outbound(&self) -> Outbound {
        Outbound {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Bind and start the readiness loop.
    ///
    /// Returns the bound address once the loop reports running. Calling
    /// `start` on a running server returns the existing address.
    pub fn start(&self, listener: Arc<dyn MessageListener>) -> Result<SocketAddr> {
        let mut running = lock(&self.running);
        if let Some(active) = running.as_ref() {
            return Ok(active.local_addr);
        }

        let addr = self.config.bind_addr();
        let socket = TcpListener::bind(addr.as_str()).map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        self.shared.running.store(true, Ordering::Release);
        let event_loop = EventLoop {
            shared: Arc::clone(&self.shared),
            socket,
            listener,
            config: self.config.clone(),
            connection: None,
            poll: PollSet::default(),
            backoff: AcceptBackoff::default(),
        };
        let (ready_tx, ready_rx) = channel::bounded(1);
        let thread = thread::Builder::new()
            .name("opcmsg-server".to_string())
            .spawn(move || event_loop.run(ready_tx));
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(err.into());
            }
        };

        match ready_rx.recv_timeout(self.config.startup_timeout) {
            Ok(()) => {}
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.waker.wake();
                return Err(match err {
                    RecvTimeoutError::Timeout => {
                        TransportError::StartupTimeout(self.config.startup_timeout)
                    }
                    RecvTimeoutError::Disconnected => TransportError::Shutdown,
                });
            }
        }

        info!(addr = %local_addr, "listening");
        *running = Some(Running { local_addr, thread });
        Ok(local_addr)
    }

    /// Tear down any client, close the listening socket and stop the loop.
    ///
    /// Idempotent. Must not be called from a listener callback.
    pub fn stop(&self) {
        let Some(active) = lock(&self.running).take() else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        self.shared.waker.wake();
        if active.thread.join().is_err() {
            warn!("readiness loop panicked");
        }
        info!(addr = %active.local_addr, "server stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some() && self.shared.running.load(Ordering::Acquire)
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.running).as_ref().map(|r| r.local_addr)
    }

    /// Queue an already serialized message for the connected client.
    pub fn submit(&self, bytes: Bytes) -> Result<()> {
        self.shared.submit(bytes)
    }

    /// Serialize and queue a message for the connected client.
    pub fn submit_message(&self, message: &Message) -> Result<()> {
        self.shared.submit_message(message)
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    reads: Sender<Bytes>,
    worker: JoinHandle<()>,
    aborted: Arc<AtomicBool>,
}

/// Pauses accepting for a short while after an accept error.
#[derive(Debug, Default)]
struct AcceptBackoff {
    until: Option<Instant>,
}

impl AcceptBackoff {
    fn pause(&mut self, now: Instant) {
        self.until = Some(now + ACCEPT_BACKOFF);
    }

    /// Time left before accepting resumes, or `None` once it has.
    fn remaining(&mut self, now: Instant) -> Option<Duration> {
        let until = self.until?;
        if now >= until {
            self.until = None;
            return None;
        }
        Some(until - now)
    }
}

struct EventLoop {
    shared: Arc<Shared>,
    socket: TcpListener,
    listener: Arc<dyn MessageListener>,
    config: ServerConfig,
    connection: Option<Connection>,
    poll: PollSet,
    backoff: AcceptBackoff,
}

impl EventLoop {
    fn run(mut self, ready: Sender<()>) {
        let _ = ready.send(());
        drop(ready);
        debug!("readiness loop running");

        while self.shared.running.load(Ordering::Acquire) {
            self.poll.clear();
            let waker_idx = self.poll.register(self.shared.waker.fd(), READABLE);
            let paused = self.backoff.remaining(Instant::now());
            let accept_idx = match paused {
                Some(_) => None,
                None => Some(self.poll.register(self.socket.as_raw_fd(), READABLE)),
            };
            let conn_idx = match &self.connection {
                Some(conn) => {
                    let mut events = READABLE;
                    if self.shared.has_pending_writes() {
                        events |= WRITABLE;
                    }
                    Some(self.poll.register(conn.stream.as_raw_fd(), events))
                }
                None => None,
            };

            let timeout = paused.map_or(self.config.recv_timeout, |left| {
                left.min(self.config.recv_timeout)
            });
            match self.poll.wait(timeout) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "poll failed, stopping server");
                    self.listener.error_occurred(&TransportError::Poll(err));
                    self.shared.running.store(false, Ordering::Release);
                    break;
                }
            }

            if self.poll.readiness(waker_idx).is_readable() {
                self.shared.waker.drain();
            }
            if let Some(idx) = accept_idx {
                if self.poll.readiness(idx).is_readable() {
                    self.accept();
                }
            }
            if let Some(idx) = conn_idx {
                let ready = self.poll.readiness(idx);
                if (ready.is_readable() || ready.is_error()) && !self.read_ready() {
                    continue;
                }
                if ready.is_writable() {
                    self.write_ready();
                }
            }
        }

        self.close_connection();
        debug!("readiness loop exited");
    }

    fn accept(&mut self) {
        loop {
            match self.socket.accept() {
                Ok((stream, peer)) => {
                    if self.connection.is_some() {
                        info!(peer = %peer, "rejecting connection, a client is already served");
                        let _ = stream.shutdown(Shutdown::Both);
                        drop(stream);
                        self.listener.rejected(peer);
                        continue;
                    }
                    match self.open_connection(stream, peer) {
                        Ok(()) => self.listener.accepted(peer),
                        Err(err) => {
                            warn!(peer = %peer, error = %err, "failed to set up connection");
                            self.listener.error_occurred(&err);
                        }
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, backoff = ?ACCEPT_BACKOFF, "accept failed");
                    self.listener.error_occurred(&TransportError::Accept(err));
                    self.backoff.pause(Instant::now());
                    return;
                }
            }
        }
    }

    fn open_connection(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        let (reads, inbox) = channel::unbounded();
        let aborted = Arc::new(AtomicBool::new(false));
        let worker = FramingWorker {
            inbox,
            framer: MessageFramer::new(self.config.max_body_size),
            listener: Arc::clone(&self.listener),
            peer,
            aborted: Arc::clone(&aborted),
        };
        let worker = thread::Builder::new()
            .name(format!("opcmsg-conn-{peer}"))
            .spawn(move || worker.run())?;

        {
            let mut outgoing = lock(&self.shared.outgoing);
            outgoing.peer = Some(peer);
            outgoing.queue.clear();
        }
        info!(peer = %peer, "client connected");
        self.connection = Some(Connection {
            stream,
            peer,
            reads,
            worker,
            aborted,
        });
        Ok(())
    }

    /// Returns `false` when the connection was torn down.
    fn read_ready(&mut self) -> bool {
        let Some(conn) = self.connection.as_ref() else {
            return false;
        };
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let outcome = loop {
            match (&conn.stream).read(&mut chunk) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match outcome {
            Ok(0) => {
                debug!(peer = %conn.peer, "end of stream");
                self.close_connection();
                false
            }
            Ok(n) => {
                trace!(peer = %conn.peer, len = n, bytes = %hex(&chunk[..n]), "read");
                let _ = conn.reads.send(Bytes::copy_from_slice(&chunk[..n]));
                true
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => true,
            Err(err) => {
                warn!(peer = %conn.peer, error = %err, "read failed");
                self.listener.error_occurred(&TransportError::Io(err));
                self.close_connection();
                false
            }
        }
    }

    fn write_ready(&mut self) {
        let Some(conn) = self.connection.as_ref() else {
            return;
        };
        let mut done = Vec::new();
        let failure = {
            let mut outgoing = lock(&self.shared.outgoing);
            loop {
                let Some(front) = outgoing.queue.front_mut() else {
                    break None;
                };
                match (&conn.stream).write(&front.buf[front.written..]) {
                    Ok(0) => break Some(io::Error::from(ErrorKind::WriteZero)),
                    Ok(n) => {
                        front.written += n;
                        if front.written == front.buf.len() {
                            if let Some(finished) = outgoing.queue.pop_front() {
                                done.push(finished.buf);
                            }
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break None,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => break Some(err),
                }
            }
        };

        for buf in done {
            trace!(peer = %conn.peer, len = buf.len(), bytes = %hex(&buf), "sent");
            self.listener.sent(&buf);
        }
        if let Some(err) = failure {
            warn!(peer = %conn.peer, error = %err, "write failed");
            self.listener.error_occurred(&TransportError::Io(err));
            self.close_connection();
        }
    }

    fn close_connection(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };
        {
            let mut outgoing = lock(&self.shared.outgoing);
            outgoing.peer = None;
            outgoing.queue.clear();
        }

        let Connection {
            stream,
            peer,
            reads,
            worker,
            aborted,
        } = conn;
        aborted.store(true, Ordering::Release);
        drop(reads);
        if worker.join().is_err() {
            warn!(peer = %peer, "framing worker panicked");
        }
        let _ = stream.shutdown(Shutdown::Both);
        drop(stream);

        info!(peer = %peer, "client disconnected");
        self.listener.disconnected(peer);
    }
}

/// Drains inbound chunks through the framer for one connection.
struct FramingWorker {
    inbox: Receiver<Bytes>,
    framer: MessageFramer,
    listener: Arc<dyn MessageListener>,
    peer: SocketAddr,
    aborted: Arc<AtomicBool>,
}

impl FramingWorker {
    fn run(mut self) {
        debug!(peer = %self.peer, "framing worker started");
        for chunk in self.inbox.iter() {
            if self.aborted.load(Ordering::Acquire) {
                break;
            }
            for outcome in self.framer.push_all(&chunk) {
                match outcome {
                    Ok(frame) => self.listener.received(&frame.header, &frame.body),
                    Err(err) => {
                        warn!(peer = %self.peer, error = %err, "discarding malformed frame");
                        self.listener.error_occurred(&err.into());
                    }
                }
            }
        }
        debug!(peer = %self.peer, "framing worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use opcmsg_codec::{MessageHeader, ParamId, ParamRequest, ParamValue, ReadResponse};
    use opcmsg_frame::{FrameReader, FrameWriter};

    use super::*;

    #[derive(Debug)]
    enum Seen {
        Received(MessageHeader, Vec<u8>),
        Sent(usize),
        Accepted(SocketAddr),
        Rejected(SocketAddr),
        Disconnected(SocketAddr),
        Error(String),
    }

    struct Recorder {
        tx: Sender<Seen>,
    }

    impl MessageListener for Recorder {
        fn received(&self, header: &MessageHeader, body: &[u8]) {
            let _ = self.tx.send(Seen::Received(*header, body.to_vec()));
        }

        fn sent(&self, bytes: &[u8]) {
            let _ = self.tx.send(Seen::Sent(bytes.len()));
        }

        fn accepted(&self, peer: SocketAddr) {
            let _ = self.tx.send(Seen::Accepted(peer));
        }

        fn rejected(&self, peer: SocketAddr) {
            let _ = self.tx.send(Seen::Rejected(peer));
        }

        fn disconnected(&self, peer: SocketAddr) {
            let _ = self.tx.send(Seen::Disconnected(peer));
        }

        fn error_occurred(&self, error: &TransportError) {
            let _ = self.tx.send(Seen::Error(error.to_string()));
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_recv_timeout(Duration::from_millis(50))
    }

    fn start_server() -> (MessageServer, SocketAddr, Receiver<Seen>) {
        let server = MessageServer::new(test_config()).expect("server");
        let (tx, rx) = channel::unbounded();
        let addr = server.start(Arc::new(Recorder { tx })).expect("start");
        (server, addr, rx)
    }

    fn next(rx: &Receiver<Seen>) -> Seen {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("listener event")
    }

    fn connect(addr: SocketAddr, rx: &Receiver<Seen>) -> TcpStream {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        match next(rx) {
            Seen::Accepted(peer) => assert_eq!(peer, stream.local_addr().unwrap()),
            other => panic!("expected accepted, got {other:?}"),
        }
        stream
    }

    fn read_request(id: u32) -> Message {
        Message::read(id, ParamId::numeric(2, 5))
    }

    #[test]
    fn start_returns_bound_address_and_stop_is_idempotent() {
        let (server, addr, _rx) = start_server();
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);
        assert_eq!(server.start(Arc::new(Recorder { tx: channel::unbounded().0 })).unwrap(), addr);

        server.stop();
        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[test]
    fn bind_failure_is_reported() {
        let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();
        let server = MessageServer::new(test_config().with_port(port)).unwrap();
        let err = server
            .start(Arc::new(Recorder { tx: channel::unbounded().0 }))
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(!server.is_running());
    }

    #[test]
    fn submit_requires_running_server_and_client() {
        let server = MessageServer::new(test_config()).unwrap();
        let bytes = read_request(1).serialize().unwrap();
        assert!(matches!(server.submit(bytes.clone()), Err(TransportError::NotRunning)));

        let (tx, _rx) = channel::unbounded();
        server.start(Arc::new(Recorder { tx })).unwrap();
        assert!(matches!(server.submit(bytes), Err(TransportError::NotConnected)));
        assert!(!server.outbound().is_connected());
    }

    #[test]
    fn request_received_and_response_delivered() {
        let (server, addr, rx) = start_server();
        let stream = connect(addr, &rx);

        let mut writer = FrameWriter::new(stream.try_clone().unwrap());
        writer.write_message(&read_request(7)).unwrap();
        let (header, body) = match next(&rx) {
            Seen::Received(header, body) => (header, body),
            other => panic!("expected received, got {other:?}"),
        };
        assert_eq!(header.correlation_id, 7);
        assert_eq!(Message::decode(&header, &body).unwrap(), read_request(7));

        let request = ParamRequest {
            correlation_id: 7,
            param_id: ParamId::numeric(2, 5),
        };
        let response = Message::ReadResponse(ReadResponse::success(&request, ParamValue::Int(42)));
        server.outbound().submit_message(&response).unwrap();

        let mut reader = FrameReader::new(stream);
        assert_eq!(reader.read_message().unwrap(), response);
        match next(&rx) {
            Seen::Sent(len) => assert_eq!(len, response.byte_count()),
            other => panic!("expected sent, got {other:?}"),
        }
    }

    #[test]
    fn writes_drain_in_submission_order() {
        let (server, addr, rx) = start_server();
        let stream = connect(addr, &rx);
        for id in 1..=20 {
            server.submit_message(&read_request(id)).unwrap();
        }
        let mut reader = FrameReader::new(stream);
        for id in 1..=20 {
            assert_eq!(reader.read_frame().unwrap().header.correlation_id, id);
        }
    }

    #[test]
    fn second_client_is_rejected_while_first_is_served() {
        let (_server, addr, rx) = start_server();
        let first = connect(addr, &rx);

        let mut second = TcpStream::connect(addr).unwrap();
        second
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        match next(&rx) {
            Seen::Rejected(peer) => assert_eq!(peer, second.local_addr().unwrap()),
            other => panic!("expected rejected, got {other:?}"),
        }
        let mut buf = [0u8; 1];
        assert!(matches!(second.read(&mut buf), Ok(0) | Err(_)));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        FrameWriter::new(first)
            .write_message(&read_request(3))
            .unwrap();
        assert!(matches!(next(&rx), Seen::Received(h, _) if h.correlation_id == 3));
    }

    #[test]
    fn disconnect_frees_the_slot_for_a_new_client() {
        let (server, addr, rx) = start_server();
        let first = connect(addr, &rx);
        let first_addr = first.local_addr().unwrap();
        drop(first);

        match next(&rx) {
            Seen::Disconnected(peer) => assert_eq!(peer, first_addr),
            other => panic!("expected disconnected, got {other:?}"),
        }
        assert!(matches!(
            server.submit_message(&read_request(1)),
            Err(TransportError::NotConnected)
        ));

        let _second = connect(addr, &rx);
        assert!(server.outbound().is_connected());
    }

    #[test]
    fn split_delivery_yields_one_message() {
        let (_server, addr, rx) = start_server();
        let mut stream = connect(addr, &rx);
        let wire = read_request(9).serialize().unwrap();

        stream.write_all(&wire[..5]).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(100));
        stream.write_all(&wire[5..]).unwrap();

        match next(&rx) {
            Seen::Received(header, body) => {
                assert_eq!(Message::decode(&header, &body).unwrap(), read_request(9));
            }
            other => panic!("expected received, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_is_reported_and_stream_continues() {
        let (_server, addr, rx) = start_server();
        let mut stream = connect(addr, &rx);
        let mut wire = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01];
        wire.extend_from_slice(&read_request(2).serialize().unwrap());
        stream.write_all(&wire).unwrap();

        assert!(matches!(next(&rx), Seen::Error(msg) if msg.contains("invalid message length")));
        assert!(matches!(next(&rx), Seen::Received(h, _) if h.correlation_id == 2));
    }

    #[test]
    fn stop_disconnects_the_client() {
        let (server, addr, rx) = start_server();
        let mut stream = connect(addr, &rx);
        server.stop();

        assert!(matches!(next(&rx), Seen::Disconnected(_)));
        let mut buf = [0u8; 1];
        assert!(matches!(stream.read(&mut buf), Ok(0) | Err(_)));
    }

    #[test]
    fn accept_backoff_expires() {
        let mut backoff = AcceptBackoff::default();
        let now = Instant::now();
        assert_eq!(backoff.remaining(now), None);

        backoff.pause(now);
        assert_eq!(backoff.remaining(now), Some(ACCEPT_BACKOFF));
        let later = now + ACCEPT_BACKOFF / 2;
        assert_eq!(backoff.remaining(later), Some(ACCEPT_BACKOFF / 2));

        assert_eq!(backoff.remaining(now + ACCEPT_BACKOFF), None);
        assert_eq!(backoff.remaining(now), None);
    }
}
