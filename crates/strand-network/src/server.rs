use std::net::{SocketAddr, TcpListener, UdpSocket};

use socket2::{Domain, Socket, Type};
use strand::{
    WorkerError,
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, WorkerSpec},
};
use strand_timing::Millis;
use strand_utils::Label;
use tracing::{info, warn};

use crate::{
    NetError, Readiness, RelaySocket,
    backoff::Backoff,
    duplex::{DuplexSettings, run_duplex},
    interruptible_sleep, wait_readable,
};

pub const SERVER_LABEL: &str = "SERVER";
/// Queue label of the first session's send worker, where the file feeder
/// seeds outbound data.
pub const SERVER_SEND_LABEL: &str = "SERVER.SEND";

const LISTEN_BACKLOG: i32 = 5;
const ACCEPT_WAIT: Millis = Millis::from_secs(1);
const ACCEPT_ERROR_PAUSE: Millis = Millis::from_secs(1);
const INITIAL_BACKOFF: Millis = Millis::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub port: u16,
    pub protocol: Protocol,
    pub backoff_max: Millis,
    pub retry_limit: u32,
    pub thread_wait: Millis,
    pub io_timeout: Millis,
    pub relay_enabled: bool,
    pub peer_queue: Option<Label>,
}

// The listener walks CreateSocket -> Bind -> Listen -> Accept, dropping
// into Fail (and the backoff ladder) whenever a step errors out.
enum ListenState {
    CreateSocket,
    Bind(Socket),
    Listen(Socket),
    Accept(TcpListener),
    Fail(NetError),
}

/// The SERVER thread: owns the listening socket and runs one duplex pair
/// per accepted connection.
pub struct ServerListener {
    settings: ServerSettings,
    sessions: usize,
}

impl ServerListener {
    pub fn new(settings: ServerSettings) -> Self {
        Self { settings, sessions: 0 }
    }

    pub fn spec(settings: ServerSettings) -> WorkerSpec {
        let config = ThreadConfig::new(SERVER_LABEL).expect("static label").essential();
        WorkerSpec::new(Self::new(settings), config)
    }

    fn duplex_settings(&mut self) -> DuplexSettings {
        let session = self.sessions;
        self.sessions += 1;
        DuplexSettings {
            role: SERVER_LABEL,
            session,
            relay_enabled: self.settings.relay_enabled,
            peer_queue: self.settings.peer_queue,
            max_message_size: strand_communication::MAX_PAYLOAD,
            io_timeout: self.settings.io_timeout,
            thread_wait: self.settings.thread_wait,
        }
    }

    fn listen_addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.settings.port).into()
    }

    fn create_socket() -> Result<Socket, NetError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).map_err(NetError::Create)?;
        socket.set_reuse_address(true).map_err(NetError::Option)?;
        Ok(socket)
    }

    fn bind(&self, socket: &Socket) -> Result<(), NetError> {
        let addr = self.listen_addr();
        socket
            .bind(&addr.into())
            .map_err(|source| NetError::Bind { addr: addr.to_string(), source })
    }

    fn listen(&self, socket: Socket) -> Result<TcpListener, NetError> {
        let addr = self.listen_addr();
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| NetError::Listen { addr: addr.to_string(), source })?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true).map_err(NetError::Option)?;
        info!(%addr, "listening");
        Ok(listener)
    }

    // One accepted connection at a time: the accepted socket's duplex
    // runs on this thread until the peer goes away.
    fn accept_loop(&mut self, listener: &TcpListener) -> Result<(), NetError> {
        while !shutdown_signalled() {
            match wait_readable(listener, ACCEPT_WAIT)? {
                Readiness::TimedOut => continue,
                Readiness::Ready => {}
            }
            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(err) => {
                    warn!(%err, "transient accept failure");
                    interruptible_sleep(ACCEPT_ERROR_PAUSE);
                    continue;
                }
            };
            info!(%peer, "client connected");
            let settings = self.duplex_settings();
            if let Err(err) = run_duplex(RelaySocket::tcp(stream)?, &settings) {
                warn!(%err, "connection handling failed");
            }
        }
        Ok(())
    }

    fn run_udp(&mut self) -> Result<(), WorkerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.settings.port).into();
        let socket = UdpSocket::bind(addr)
            .map_err(|source| NetError::Bind { addr: addr.to_string(), source })?;
        info!(%addr, "datagram endpoint up");
        let settings = self.duplex_settings();
        run_duplex(RelaySocket::udp(socket, None)?, &settings)
    }

    fn run_tcp(&mut self) -> Result<(), WorkerError> {
        let mut backoff =
            Backoff::new(INITIAL_BACKOFF, self.settings.backoff_max, self.settings.retry_limit);
        let mut state = ListenState::CreateSocket;
        while !shutdown_signalled() {
            state = match state {
                ListenState::CreateSocket => match Self::create_socket() {
                    Ok(socket) => ListenState::Bind(socket),
                    Err(err) => ListenState::Fail(err),
                },
                ListenState::Bind(socket) => match self.bind(&socket) {
                    Ok(()) => ListenState::Listen(socket),
                    Err(err) => ListenState::Fail(err),
                },
                ListenState::Listen(socket) => match self.listen(socket) {
                    Ok(listener) => {
                        backoff.reset();
                        ListenState::Accept(listener)
                    }
                    Err(err) => ListenState::Fail(err),
                },
                ListenState::Accept(listener) => match self.accept_loop(&listener) {
                    Ok(()) => return Ok(()),
                    Err(err) => ListenState::Fail(err),
                },
                ListenState::Fail(err) => {
                    let Some(delay) = backoff.next_delay() else {
                        warn!(%err, "listener out of retries");
                        return Err(err.into());
                    };
                    warn!(%err, delay_ms = delay.as_u64(), "listener retrying");
                    interruptible_sleep(delay);
                    ListenState::CreateSocket
                }
            };
        }
        Ok(())
    }
}

impl Worker for ServerListener {
    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        match self.settings.protocol {
            Protocol::Tcp => self.run_tcp(),
            Protocol::Udp => {
                let mut backoff = Backoff::new(
                    INITIAL_BACKOFF,
                    self.settings.backoff_max,
                    self.settings.retry_limit,
                );
                while !shutdown_signalled() {
                    match self.run_udp() {
                        Ok(()) => continue,
                        Err(err) => {
                            let Some(delay) = backoff.next_delay() else {
                                warn!(%err, "datagram endpoint out of retries");
                                return Err(err);
                            };
                            warn!(%err, delay_ms = delay.as_u64(), "datagram endpoint retrying");
                            interruptible_sleep(delay);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
