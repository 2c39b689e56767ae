use mio::net::TcpStream;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

/// A non-blocking TCP socket, exposing exactly the collaborator contract named in
/// §6: best-effort read/write, a hard disconnect, and the raw `mio` source for
/// registration. Readiness dispatch (`set_on_read`/`set_on_write`) is the session
/// engine's job — it owns the `Token -> session` map and calls these methods
/// directly when `mio` reports the corresponding readiness.
pub struct Socket {
    inner: TcpStream,
}

impl Socket {
    pub fn from_stream(inner: TcpStream) -> Self {
        Socket { inner }
    }

    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Ok(Socket {
            inner: TcpStream::connect(addr)?,
        })
    }

    pub fn inner_mut(&mut self) -> &mut TcpStream {
        &mut self.inner
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Reads everything currently available into `buf`, growing it as needed.
    /// Returns `true` once the peer has closed its write half (a genuine `read`
    /// returning `0`), as opposed to `false` meaning "drained for now" — a spurious
    /// readable wakeup with nothing to read looks the same as "drained" to the
    /// caller, never as "closed".
    pub fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        let mut chunk = [0u8; 8192];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        return Ok(false);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes as much of `buf` as can be written without blocking.
    pub fn write_partial(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub fn force_disconnect(&mut self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}
