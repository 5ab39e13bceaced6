use std::io;

use thiserror::Error;

/// Platform-level socket errors.
///
/// The originating OS error code is preserved wherever one exists, so the
/// diagnostic survives mapping into other domains.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("couldn't create socket")]
    Create(#[source] io::Error),
    #[error("couldn't bind {addr}")]
    Bind { addr: String, source: io::Error },
    #[error("couldn't listen on {addr}")]
    Listen { addr: String, source: io::Error },
    #[error("accept failed")]
    Accept(#[source] io::Error),
    #[error("couldn't connect to {addr}")]
    Connect { addr: String, source: io::Error },
    #[error("couldn't resolve host {host}")]
    Resolve { host: String, source: io::Error },
    #[error("host not found: {0}")]
    HostNotFound(String),
    #[error("send failed")]
    Send(#[source] io::Error),
    #[error("receive failed")]
    Receive(#[source] io::Error),
    #[error("peer closed the connection")]
    PeerShutdown,
    #[error("operation timed out")]
    Timeout,
    #[error("operation would block")]
    WouldBlock,
    #[error("no peer to send to yet")]
    NoPeer,
    #[error("couldn't apply socket option")]
    Option(#[source] io::Error),
    #[error("poll failed")]
    Poll(#[source] io::Error),
}

impl NetError {
    /// Timeouts and would-blocks are continuations, everything else is
    /// terminal for the connection.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, NetError::Timeout | NetError::WouldBlock | NetError::NoPeer)
    }

    pub(crate) fn from_send(err: io::Error) -> Self {
        Self::io_or(err, NetError::Send)
    }

    pub(crate) fn from_recv(err: io::Error) -> Self {
        Self::io_or(err, NetError::Receive)
    }

    fn io_or(err: io::Error, wrap: fn(io::Error) -> Self) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => NetError::WouldBlock,
            io::ErrorKind::TimedOut => NetError::Timeout,
            _ => wrap(err),
        }
    }
}

impl From<NetError> for strand::WorkerError {
    fn from(err: NetError) -> Self {
        strand::WorkerError::Other(Box::new(err))
    }
}
