use super::socket::Socket;
use mio::net::TcpListener;
use std::io;
use std::net::SocketAddr;

/// Bound to a local IPv4 endpoint; `accept` yields one connected `Socket` per call,
/// matching the collaborator contract of §6.
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Acceptor {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn listener_mut(&mut self) -> &mut TcpListener {
        &mut self.listener
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Non-blocking accept; `Ok(None)` means nothing pending right now.
    pub fn accept(&mut self) -> io::Result<Option<(Socket, SocketAddr)>> {
        match self.listener.accept() {
            Ok((stream, addr)) => Ok(Some((Socket::from_stream(stream), addr))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
