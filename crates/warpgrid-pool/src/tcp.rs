//! Plain TCP transport for pooled node connections.
//!
//! The backend performs no protocol parsing. Reads go through a
//! [`BufReader`] so that reply bytes read off the socket but not yet handed
//! to the caller stay visible through [`ConnectionBackend::buffered`]; a
//! connection returned to the pool with a non-empty buffer is discarded.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::PoolOptions;
use crate::conn::{ConnectionBackend, Dialer};

// ── TcpBackend ───────────────────────────────────────────────────────

/// A [`ConnectionBackend`] over a buffered TCP stream.
pub struct TcpBackend {
    reader: BufReader<TcpStream>,
}

impl std::fmt::Debug for TcpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpBackend")
            .field("peer", &self.reader.get_ref().peer_addr().ok())
            .field("buffered", &self.reader.buffer().len())
            .finish()
    }
}

impl TcpBackend {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }
}

impl ConnectionBackend for TcpBackend {
    fn send(&mut self, data: &[u8]) -> Result<usize, String> {
        self.reader
            .get_mut()
            .write_all(data)
            .map_err(|e| format!("tcp send: {e}"))?;
        Ok(data.len())
    }

    /// Returns buffered bytes first and only reads from the socket when the
    /// buffer is empty. An empty result means the peer closed the stream.
    fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, String> {
        let available = self
            .reader
            .fill_buf()
            .map_err(|e| format!("tcp recv: {e}"))?;
        let n = available.len().min(max_bytes);
        let data = available[..n].to_vec();
        self.reader.consume(n);
        Ok(data)
    }

    fn buffered(&self) -> &[u8] {
        self.reader.buffer()
    }

    fn close(&mut self) -> Result<(), String> {
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(format!("tcp shutdown: {e}")),
        }
    }
}

// ── TcpDialer ────────────────────────────────────────────────────────

/// Dialer opening plain TCP connections to one node address.
#[derive(Clone, Debug)]
pub struct TcpDialer {
    addr: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            read_timeout,
        }
    }

    /// Dialer using the connect and read timeouts from pool options.
    pub fn from_options(addr: impl Into<String>, options: &PoolOptions) -> Self {
        Self::new(addr, options.connect_timeout, options.read_timeout)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Dialer for TcpDialer {
    fn dial(&self) -> Result<Box<dyn ConnectionBackend>, String> {
        let addr = self
            .addr
            .to_socket_addrs()
            .map_err(|e| format!("dns resolution failed for {}: {e}", self.addr))?
            .next()
            .ok_or_else(|| format!("no address found for {}", self.addr))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| format!("tcp connect to {}: {e}", self.addr))?;

        // A zero read timeout is rejected by the OS; treat it as "no timeout".
        let read_timeout = Some(self.read_timeout).filter(|t| !t.is_zero());
        stream
            .set_read_timeout(read_timeout)
            .map_err(|e| format!("set read timeout: {e}"))?;
        let _ = stream.set_nodelay(true);

        tracing::debug!(addr = %self.addr, resolved = %addr, "established tcp connection");
        Ok(Box::new(TcpBackend::new(stream)))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{SocketAddr, TcpListener};

    /// Start a TCP echo server in a background thread. Returns its address.
    fn start_echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            while let Ok((mut stream, _)) = listener.accept() {
                std::thread::spawn(move || {
                    let mut buf = [0u8; 4096];
                    loop {
                        match stream.read(&mut buf) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    fn dialer(addr: SocketAddr) -> TcpDialer {
        TcpDialer::new(addr.to_string(), Duration::from_secs(2), Duration::from_secs(2))
    }

    #[test]
    fn send_and_recv_roundtrip() {
        let addr = start_echo_server();
        let mut backend = dialer(addr).dial().unwrap();

        assert_eq!(backend.send(b"PING\r\n").unwrap(), 6);
        assert_eq!(backend.recv(1024).unwrap(), b"PING\r\n");
        assert!(backend.buffered().is_empty());
        backend.close().unwrap();
    }

    #[test]
    fn partial_recv_leaves_bytes_buffered() {
        let addr = start_echo_server();
        let mut backend = dialer(addr).dial().unwrap();

        backend.send(b"+OK\r\n+OK\r\n").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(backend.recv(5).unwrap(), b"+OK\r\n");
        assert_eq!(backend.buffered(), b"+OK\r\n");
        assert_eq!(backend.recv(5).unwrap(), b"+OK\r\n");
        assert!(backend.buffered().is_empty());
    }

    #[test]
    fn dial_refused_reports_address() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = dialer(addr).dial().unwrap_err();
        assert!(err.contains(&addr.to_string()), "{err}");
    }

    #[test]
    fn dial_unresolvable_host() {
        let dialer = TcpDialer::new(
            "no-such-host.invalid:6379",
            Duration::from_millis(200),
            Duration::from_millis(200),
        );
        let err = dialer.dial().unwrap_err();
        assert!(err.contains("no-such-host.invalid"), "{err}");
    }

    #[test]
    fn from_options_uses_pool_timeouts() {
        let options = PoolOptions::default();
        let dialer = TcpDialer::from_options("127.0.0.1:6379", &options);
        assert_eq!(dialer.addr(), "127.0.0.1:6379");
        assert_eq!(dialer.connect_timeout, options.connect_timeout);
        assert_eq!(dialer.read_timeout, options.read_timeout);
    }
}
