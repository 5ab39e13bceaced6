use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use strand::{
    WorkerError,
    shutdown::shutdown_signalled,
    supervisor::{ThreadConfig, Worker, WorkerContext, WorkerSpec},
};
use strand_timing::Millis;
use strand_utils::Label;
use tracing::{info, warn};

use crate::{
    NetError, RelaySocket,
    backoff::Backoff,
    duplex::{DuplexSettings, run_duplex},
    interruptible_sleep,
};

pub const CLIENT_LABEL: &str = "CLIENT";

const CONNECT_TIMEOUT: Millis = Millis::from_secs(5);
const RECONNECT_PAUSE: Millis = Millis(200);

#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub hostname: String,
    pub port: u16,
    pub backoff_initial: Millis,
    pub backoff_max: Millis,
    pub retry_limit: u32,
    pub thread_wait: Millis,
    pub io_timeout: Millis,
    pub relay_enabled: bool,
    pub peer_queue: Option<Label>,
}

/// The CLIENT thread: resolves, connects with a bounded timeout, runs the
/// connection's duplex pair, and reconnects with doubling backoff.
pub struct ClientConnector {
    settings: ClientSettings,
    sessions: usize,
}

impl ClientConnector {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings, sessions: 0 }
    }

    pub fn spec(settings: ClientSettings) -> WorkerSpec {
        let config = ThreadConfig::new(CLIENT_LABEL).expect("static label");
        WorkerSpec::new(Self::new(settings), config)
    }

    fn resolve(&self) -> Result<SocketAddr, NetError> {
        let host = format!("{}:{}", self.settings.hostname, self.settings.port);
        let mut addrs = host
            .to_socket_addrs()
            .map_err(|source| NetError::Resolve { host: host.clone(), source })?;
        addrs.next().ok_or(NetError::HostNotFound(host))
    }

    fn connect(&self) -> Result<TcpStream, NetError> {
        let addr = self.resolve()?;
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT.into())
            .map_err(|source| NetError::Connect { addr: addr.to_string(), source })
    }

    fn duplex_settings(&mut self) -> DuplexSettings {
        let session = self.sessions;
        self.sessions += 1;
        DuplexSettings {
            role: CLIENT_LABEL,
            session,
            relay_enabled: self.settings.relay_enabled,
            peer_queue: self.settings.peer_queue,
            max_message_size: strand_communication::MAX_PAYLOAD,
            io_timeout: self.settings.io_timeout,
            thread_wait: self.settings.thread_wait,
        }
    }
}

// Connect -> Established -> Reconnect, with Fail driving the backoff
// ladder back into Connect.
enum ConnectState {
    Connect,
    Established(TcpStream),
    Reconnect,
    Fail(NetError),
}

impl Worker for ClientConnector {
    fn run(&mut self, _cx: &WorkerContext) -> Result<(), WorkerError> {
        let mut backoff = Backoff::new(
            self.settings.backoff_initial,
            self.settings.backoff_max,
            self.settings.retry_limit,
        );
        let mut state = ConnectState::Connect;
        while !shutdown_signalled() {
            state = match state {
                ConnectState::Connect => match self.connect() {
                    Ok(stream) => {
                        backoff.reset();
                        info!(peer = ?stream.peer_addr().ok(), "connected");
                        ConnectState::Established(stream)
                    }
                    Err(err) => ConnectState::Fail(err),
                },
                ConnectState::Established(stream) => {
                    let settings = self.duplex_settings();
                    if let Err(err) = run_duplex(RelaySocket::tcp(stream)?, &settings) {
                        warn!(%err, "connection handling failed");
                    }
                    ConnectState::Reconnect
                }
                ConnectState::Reconnect => {
                    // Peer dropped us or shutdown began; breathe, then
                    // walk the connect ladder again.
                    interruptible_sleep(RECONNECT_PAUSE);
                    ConnectState::Connect
                }
                ConnectState::Fail(err) => {
                    let Some(delay) = backoff.next_delay() else {
                        warn!(%err, "connector out of retries");
                        return Err(err.into());
                    };
                    warn!(%err, delay_ms = delay.as_u64(), "connect failed, retrying");
                    interruptible_sleep(delay);
                    ConnectState::Connect
                }
            };
        }
        Ok(())
    }
}
