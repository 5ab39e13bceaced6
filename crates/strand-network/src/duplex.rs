use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use strand::{
    WorkerError,
    registry::registry,
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, spawn_worker},
};
use strand_communication::{Message, MessageKind};
use strand_timing::Millis;
use strand_utils::{HexDumper, Label};
use tracing::{debug, info, warn};

use crate::{NetError, Readiness, RelaySocket, wait_readable, wait_writable};

/// Largest single receive, matching the recorder's dump granularity.
const RECV_BUF: usize = 2048;
/// Fixed timeout for pushing a relay message into the peer's queue.
const RELAY_PUSH_TIMEOUT: Millis = Millis::from_secs(5);
/// How often the duplex owner samples the latch and the shutdown flag.
const SUPERVISE_NAP: Millis = Millis(100);

/// Per-connection parameters shared by both duplex workers.
#[derive(Clone, Debug)]
pub struct DuplexSettings {
    /// Label prefix for the worker pair, e.g. `SERVER` spawns
    /// `SERVER.SEND` and `SERVER.RECEIVE`.
    pub role: &'static str,
    /// Distinguishes concurrent sessions of the same role; session 0
    /// keeps the bare role labels.
    pub session: usize,
    pub relay_enabled: bool,
    /// Where received bytes are routed when relay is on.
    pub peer_queue: Option<Label>,
    pub max_message_size: usize,
    pub io_timeout: Millis,
    /// How long to wait for the worker pair on teardown.
    pub thread_wait: Millis,
}

/// State shared by one connection's send and receive workers.
///
/// Everything is immutable after construction except `connection_closed`,
/// a one-way latch: whichever worker hits a terminal condition first
/// stores `true` and the other observes it on its next wake.
pub struct CommContext {
    socket: RelaySocket,
    relay_enabled: bool,
    peer_queue: Option<Label>,
    max_message_size: usize,
    io_timeout: Millis,
    connection_closed: AtomicBool,
}

impl CommContext {
    pub fn new(socket: RelaySocket, settings: &DuplexSettings) -> Self {
        Self {
            socket,
            relay_enabled: settings.relay_enabled,
            peer_queue: settings.peer_queue,
            max_message_size: settings.max_message_size,
            io_timeout: settings.io_timeout,
            connection_closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.connection_closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn latch_closed(&self) {
        self.connection_closed.store(true, Ordering::Release);
    }

    pub fn is_tcp(&self) -> bool {
        self.socket.is_tcp()
    }
}

/// Runs one connection to completion: spawns the worker pair, supervises
/// the latch, then reaps the workers and closes the socket.
pub fn run_duplex(socket: RelaySocket, settings: &DuplexSettings) -> Result<(), WorkerError> {
    let ctx = Arc::new(CommContext::new(socket, settings));
    let send_label = Label::indexed(&format!("{}.SEND", settings.role), settings.session)
        .map_err(|e| WorkerError::Config(e.to_string()))?;
    let recv_label = Label::indexed(&format!("{}.RECEIVE", settings.role), settings.session)
        .map_err(|e| WorkerError::Config(e.to_string()))?;

    spawn_worker(
        Box::new(SendWorker { ctx: ctx.clone() }),
        ThreadConfig::for_label(send_label),
    )?;
    if let Err(err) = spawn_worker(
        Box::new(RecvWorker { ctx: ctx.clone(), dumper: HexDumper::new() }),
        ThreadConfig::for_label(recv_label),
    ) {
        ctx.latch_closed();
        let _ = registry().wait_for_thread(send_label, settings.thread_wait);
        return Err(err);
    }
    info!(peer = ?ctx.socket.peer_addr(), "connection up");

    while !shutdown_signalled() && !ctx.is_closed() {
        std::thread::sleep(SUPERVISE_NAP.into());
    }
    ctx.latch_closed();

    if let Err(err) =
        registry().wait_list(&[send_label, recv_label], settings.thread_wait)
    {
        warn!(%err, "duplex worker outlived its teardown budget");
    }
    ctx.socket.shutdown();
    info!(peer = ?ctx.socket.peer_addr(), "connection down");
    Ok(())
}

/// Drains the session's own queue onto the socket. Relay messages pushed
/// by a peer's receive worker and file-feeder chunks both land here.
struct SendWorker {
    ctx: Arc<CommContext>,
}

impl SendWorker {
    // Timeouts are continuations; only a terminal socket error comes back
    // as Err. Shutdown or the latch abandon the remainder.
    fn send_all(&self, mut data: &[u8]) -> Result<(), NetError> {
        while !data.is_empty() && !shutdown_signalled() && !self.ctx.is_closed() {
            match wait_writable(&self.ctx.socket, self.ctx.io_timeout)? {
                Readiness::TimedOut => continue,
                Readiness::Ready => {}
            }
            match self.ctx.socket.send(data) {
                Ok(n) => data = &data[n..],
                Err(err) if err.is_transient() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl Worker for SendWorker {
    fn run(&mut self, cx: &WorkerContext) -> Result<(), WorkerError> {
        let mut msg = Message::EMPTY;
        while !shutdown_signalled() && !self.ctx.is_closed() {
            match cx.pop_own(&mut msg, self.ctx.io_timeout) {
                Ok(()) => {}
                Err(strand::RegistryError::QueueEmpty(_)) => continue,
                Err(err) => return Err(err.into()),
            }
            if let Err(err) = self.send_all(msg.content()) {
                warn!(%err, "send worker closing the connection");
                self.ctx.latch_closed();
                break;
            }
            debug!(bytes = msg.content().len(), kind = %msg.kind(), "sent");
        }
        Ok(())
    }
}

/// Reads from the socket, dumps traffic to the log and, with relay on,
/// routes the bytes into the peer thread's queue.
struct RecvWorker {
    ctx: Arc<CommContext>,
    dumper: HexDumper,
}

impl RecvWorker {
    fn handle_data(&mut self, data: &[u8]) {
        self.dumper.dump(data, |row| info!("{row}"));

        if !self.ctx.relay_enabled {
            return;
        }
        let Some(peer) = self.ctx.peer_queue else {
            return;
        };
        if data.len() > self.ctx.max_message_size {
            // Refusing the oversize relay leaves the connection open.
            warn!(
                bytes = data.len(),
                max = self.ctx.max_message_size,
                "relay refused, payload overflows the message buffer"
            );
            return;
        }
        let msg = match Message::new(MessageKind::Relay, data) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%err, "couldn't build relay message");
                return;
            }
        };
        if let Err(err) = registry().push_message(peer, &msg, RELAY_PUSH_TIMEOUT) {
            warn!(%err, %peer, "relay push failed");
        }
    }
}

impl Worker for RecvWorker {
    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        let mut buf = [0u8; RECV_BUF];
        while !shutdown_signalled() && !self.ctx.is_closed() {
            match wait_readable(&self.ctx.socket, self.ctx.io_timeout) {
                Ok(Readiness::TimedOut) => continue,
                Ok(Readiness::Ready) => {}
                Err(err) => {
                    warn!(%err, "receive worker closing the connection");
                    self.ctx.latch_closed();
                    break;
                }
            }
            match self.ctx.socket.recv(&mut buf) {
                // Zero-length datagrams carry nothing worth recording.
                Ok(0) => {}
                Ok(n) => self.handle_data(&buf[..n]),
                Err(err) if err.is_transient() => {}
                Err(NetError::PeerShutdown) => {
                    info!("peer closed the connection");
                    self.ctx.latch_closed();
                    break;
                }
                Err(err) => {
                    warn!(%err, "receive worker closing the connection");
                    self.ctx.latch_closed();
                    break;
                }
            }
        }
        Ok(())
    }
}
