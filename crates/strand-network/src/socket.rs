use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream, UdpSocket},
    os::fd::{AsRawFd, RawFd},
};

use parking_lot::Mutex;

use crate::NetError;

/// The socket a connection duplex runs over.
///
/// TCP wraps an accepted or connected stream. UDP is connectionless: the
/// receive side latches the most recent peer address and the send side
/// targets it, so a datagram "connection" behaves like a stream pair.
pub enum RelaySocket {
    Tcp(TcpStream),
    Udp { socket: UdpSocket, peer: Mutex<Option<SocketAddr>> },
}

impl RelaySocket {
    pub fn tcp(stream: TcpStream) -> Result<Self, NetError> {
        stream.set_nonblocking(true).map_err(NetError::Option)?;
        stream.set_nodelay(true).map_err(NetError::Option)?;
        Ok(Self::Tcp(stream))
    }

    pub fn udp(socket: UdpSocket, peer: Option<SocketAddr>) -> Result<Self, NetError> {
        socket.set_nonblocking(true).map_err(NetError::Option)?;
        Ok(Self::Udp { socket, peer: Mutex::new(peer) })
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp(_))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(stream) => stream.peer_addr().ok(),
            Self::Udp { peer, .. } => *peer.lock(),
        }
    }

    /// Writes as much of `buf` as the kernel accepts right now.
    pub fn send(&self, buf: &[u8]) -> Result<usize, NetError> {
        match self {
            Self::Tcp(stream) => (&*stream).write(buf).map_err(NetError::from_send),
            Self::Udp { socket, peer } => {
                let Some(addr) = *peer.lock() else {
                    return Err(NetError::NoPeer);
                };
                socket.send_to(buf, addr).map_err(NetError::from_send)
            }
        }
    }

    /// Reads into `buf`. Orderly TCP shutdown surfaces as
    /// [`NetError::PeerShutdown`]; UDP latches the sender as the peer.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, NetError> {
        match self {
            Self::Tcp(stream) => match (&*stream).read(buf) {
                Ok(0) => Err(NetError::PeerShutdown),
                Ok(n) => Ok(n),
                Err(err) => Err(NetError::from_recv(err)),
            },
            Self::Udp { socket, peer } => {
                let (n, from) = socket.recv_from(buf).map_err(NetError::from_recv)?;
                *peer.lock() = Some(from);
                Ok(n)
            }
        }
    }

    pub fn shutdown(&self) {
        if let Self::Tcp(stream) = self {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl AsRawFd for RelaySocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(stream) => stream.as_raw_fd(),
            Self::Udp { socket, .. } => socket.as_raw_fd(),
        }
    }
}
