//! Pooled connection handle and the transport seams behind it.
//!
//! The pool never speaks the wire protocol. It only needs to create
//! transports ([`Dialer`]), ask them whether unread reply bytes are still
//! buffered, and close them. Everything else is passthrough.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Trait abstracting the underlying transport for testability.
pub trait ConnectionBackend: Send + std::fmt::Debug {
    /// Send bytes over the connection. Returns bytes sent.
    fn send(&mut self, data: &[u8]) -> Result<usize, String>;
    /// Receive up to `max_bytes` from the connection.
    fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, String>;
    /// Bytes already read off the wire but not yet consumed by the caller.
    ///
    /// A non-empty buffer on return to the pool means the reply stream is
    /// out of step with the request stream.
    fn buffered(&self) -> &[u8];
    /// Close the underlying transport.
    fn close(&mut self) -> Result<(), String>;
}

/// Factory for new transports, injected so the pool stays transport-agnostic.
pub trait Dialer: Send + Sync {
    /// Establish a new connection.
    fn dial(&self) -> Result<Box<dyn ConnectionBackend>, String>;
}

impl<F> Dialer for F
where
    F: Fn() -> Result<Box<dyn ConnectionBackend>, String> + Send + Sync,
{
    fn dial(&self) -> Result<Box<dyn ConnectionBackend>, String> {
        self()
    }
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

struct ConnInner {
    id: u64,
    backend: Mutex<Box<dyn ConnectionBackend>>,
    used_at: Mutex<Instant>,
    closed: AtomicBool,
}

/// Handle to one live transport.
///
/// Handles are cheap to clone and compare by identity. At any moment a
/// connection belongs to exactly one of: the pool's free list, a single
/// caller, or nobody (closed). The pool's registry keeps an extra handle
/// only so that `close` can shut down connections still checked out.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

impl Conn {
    /// Wrap a freshly dialed transport.
    pub fn new(backend: Box<dyn ConnectionBackend>) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
                backend: Mutex::new(backend),
                used_at: Mutex::new(Instant::now()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// When the connection was last used.
    pub fn used_at(&self) -> Instant {
        *self.inner.used_at.lock()
    }

    /// Mark the connection as used now.
    pub fn touch(&self) {
        *self.inner.used_at.lock() = Instant::now();
    }

    /// Send bytes, refreshing the last-used timestamp.
    pub fn send(&self, data: &[u8]) -> Result<usize, String> {
        if self.is_closed() {
            return Err("connection is closed".to_string());
        }
        self.touch();
        self.inner.backend.lock().send(data)
    }

    /// Receive up to `max_bytes`, refreshing the last-used timestamp.
    pub fn recv(&self, max_bytes: usize) -> Result<Vec<u8>, String> {
        if self.is_closed() {
            return Err("connection is closed".to_string());
        }
        self.touch();
        self.inner.backend.lock().recv(max_bytes)
    }

    /// Copy of any buffered-but-unread reply bytes.
    pub fn unread(&self) -> Vec<u8> {
        self.inner.backend.lock().buffered().to_vec()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the transport. Only the first call reaches the backend.
    pub fn close(&self) -> Result<(), String> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.backend.lock().close()
    }
}

impl PartialEq for Conn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Conn {}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Mock backend and dialer shared by the pool unit tests.

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    pub struct MockBackend {
        pub unread: Vec<u8>,
        pub closes: Arc<AtomicUsize>,
        pub fail_close: bool,
    }

    impl ConnectionBackend for MockBackend {
        fn send(&mut self, data: &[u8]) -> Result<usize, String> {
            Ok(data.len())
        }

        fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, String> {
            let n = max_bytes.min(self.unread.len());
            Ok(self.unread.drain(..n).collect())
        }

        fn buffered(&self) -> &[u8] {
            &self.unread
        }

        fn close(&mut self) -> Result<(), String> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err("close refused".to_string());
            }
            Ok(())
        }
    }

    /// Dialer with a dial counter, a failure switch, and a shared close counter.
    #[derive(Default)]
    pub struct MockDialer {
        pub dials: AtomicUsize,
        pub closes: Arc<AtomicUsize>,
        pub should_fail: AtomicBool,
        pub fail_close: AtomicBool,
    }

    impl MockDialer {
        pub fn dials(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        pub fn fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }
    }

    impl Dialer for MockDialer {
        fn dial(&self) -> Result<Box<dyn ConnectionBackend>, String> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err("connection refused".to_string());
            }
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockBackend {
                unread: Vec::new(),
                closes: Arc::clone(&self.closes),
                fail_close: self.fail_close.load(Ordering::SeqCst),
            }))
        }
    }

    pub fn conn() -> Conn {
        Conn::new(Box::new(MockBackend::default()))
    }
}
