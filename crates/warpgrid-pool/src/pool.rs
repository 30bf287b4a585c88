//! ConnPool: bounded per-node connection pool.
//!
//! # Acquisition
//!
//! ```text
//! get()
//!   → free list has a connection → replace it if idle too long → hit
//!   → registry has room          → reserve, dial unlocked, register → new
//!   → pool at capacity           → wait up to pool_timeout for a put/remove
//!                                  → timeout → PoolError::Timeout
//! ```
//!
//! Every dial passes through a token bucket sized to three times the pool
//! capacity per second, so a node that keeps refusing connections is not
//! hammered by reconnect storms.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::PoolOptions;
use crate::conn::{Conn, Dialer};
use crate::error::{PoolError, PoolResult};
use crate::free_list::FreeList;
use crate::limiter::DialLimiter;
use crate::registry::ConnRegistry;

/// How often the background reaper sweeps idle connections.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Pool state and accumulated counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of `get` calls on an open pool.
    pub requests: u32,
    /// Number of times a free connection was found.
    pub hits: u32,
    /// Number of times `get` had to wait for a connection.
    pub waits: u32,
    /// Number of waits that timed out.
    pub timeouts: u32,
    /// Connections owned by the pool, checked out or not.
    pub total_conns: u32,
    /// Connections sitting in the free list.
    pub free_conns: u32,
}

/// Contract shared by every pool flavour.
///
/// The command layer checks a connection out with [`get`](Pool::get) and must
/// hand it back with exactly one of [`put`](Pool::put) (healthy, reusable) or
/// [`remove`](Pool::remove) (broken).
pub trait Pool: Send + Sync {
    /// A free connection without waiting or dialing, if there is one.
    fn first(&self) -> Option<Conn>;

    /// Check out a connection. The flag is `true` when it was freshly dialed.
    fn get(&self) -> impl Future<Output = PoolResult<(Conn, bool)>> + Send;

    /// Return a healthy connection.
    fn put(&self, cn: Conn) -> PoolResult<()>;

    /// Discard a broken connection, recording `reason`.
    fn remove(&self, cn: Conn, reason: &str) -> PoolResult<()>;

    /// Connections owned by the pool.
    fn len(&self) -> usize;

    /// Connections available without waiting.
    fn free_len(&self) -> usize;

    /// Counters, for pools that keep them.
    fn stats(&self) -> Option<PoolStats>;

    /// Shut the pool down. Only the first call succeeds.
    fn close(&self) -> impl Future<Output = PoolResult<()>> + Send;
}

#[derive(Default)]
struct Counters {
    requests: AtomicU32,
    hits: AtomicU32,
    waits: AtomicU32,
    timeouts: AtomicU32,
}

struct PoolInner {
    dialer: Arc<dyn Dialer>,
    limiter: DialLimiter,
    options: PoolOptions,
    conns: ConnRegistry,
    free: FreeList,
    counters: Counters,
    closed: AtomicBool,
    last_err: Mutex<Option<String>>,
}

/// Bounded pool of connections to a single node.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnPool {
    inner: Arc<PoolInner>,
}

impl ConnPool {
    /// Create a pool. Nothing is dialed until the first `get`.
    ///
    /// When an idle timeout is configured and a tokio runtime is available,
    /// a reaper task sweeps idle connections every [`REAP_INTERVAL`] until
    /// the pool is closed or dropped.
    pub fn new(options: PoolOptions, dialer: Arc<dyn Dialer>) -> Self {
        let capacity = options.capacity();
        let inner = Arc::new(PoolInner {
            dialer,
            limiter: DialLimiter::per_second(options.dial_rate()),
            conns: ConnRegistry::new(capacity),
            free: FreeList::new(capacity),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
            last_err: Mutex::new(None),
            options,
        });
        if inner.options.idle_timeout.is_some() {
            spawn_reaper(&inner);
        }
        Self { inner }
    }

    /// Pool options.
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The most recent dial failure or removal reason.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_err.lock().clone()
    }
}

impl Pool for ConnPool {
    fn first(&self) -> Option<Conn> {
        self.inner.first()
    }

    async fn get(&self) -> PoolResult<(Conn, bool)> {
        self.inner.get().await
    }

    fn put(&self, cn: Conn) -> PoolResult<()> {
        self.inner.put(cn)
    }

    fn remove(&self, cn: Conn, reason: &str) -> PoolResult<()> {
        self.inner.remove(cn, reason)
    }

    fn len(&self) -> usize {
        self.inner.conns.len()
    }

    fn free_len(&self) -> usize {
        self.inner.free.len()
    }

    fn stats(&self) -> Option<PoolStats> {
        Some(self.inner.stats())
    }

    async fn close(&self) -> PoolResult<()> {
        self.inner.close().await
    }
}

impl std::fmt::Debug for ConnPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPool")
            .field("options", &self.inner.options)
            .field("len", &self.inner.conns.len())
            .field("free_len", &self.inner.free.len())
            .field("closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_idle(&self, cn: &Conn) -> bool {
        self.options
            .idle_timeout
            .is_some_and(|timeout| cn.used_at().elapsed() > timeout)
    }

    fn store_last_err(&self, err: &str) {
        *self.last_err.lock() = Some(err.to_string());
    }

    /// Dial a new connection, subject to the rate limit.
    fn dial(&self) -> PoolResult<Conn> {
        if !self.limiter.try_acquire() {
            return Err(PoolError::DialRateLimited {
                last_error: self.last_err.lock().clone().unwrap_or_default(),
            });
        }
        match self.dialer.dial() {
            Ok(backend) => Ok(Conn::new(backend)),
            Err(e) => {
                self.store_last_err(&e);
                Err(PoolError::Dial(e))
            }
        }
    }

    /// Swap `cn` for a freshly dialed connection. If the dial fails, `cn` is
    /// still dropped from the registry and the pool shrinks by one.
    fn replace(&self, cn: Conn) -> PoolResult<Conn> {
        let new_cn = match self.dial() {
            Ok(new_cn) => new_cn,
            Err(e) => {
                if let Err(close_err) = self.conns.remove(&cn) {
                    debug!(conn = cn.id(), error = %close_err, "close failed during replace");
                }
                return Err(e);
            }
        };
        match self.conns.replace(&cn, new_cn.clone()) {
            Err(PoolError::Closed) => return Err(PoolError::Closed),
            Err(close_err) => {
                debug!(conn = cn.id(), error = %close_err, "close failed during replace");
            }
            Ok(()) => {}
        }
        debug!(old = cn.id(), new = new_cn.id(), "replaced connection");
        Ok(new_cn)
    }

    /// Pass a popped connection through, replacing it first if it sat idle
    /// past the idle timeout.
    fn refresh_idle(&self, cn: Conn) -> PoolResult<Conn> {
        if !self.is_idle(&cn) {
            return Ok(cn);
        }
        debug!(conn = cn.id(), "replacing idle connection");
        self.replace(cn)
    }

    fn first(&self) -> Option<Conn> {
        loop {
            let cn = self.free.pop()?;
            match self.refresh_idle(cn) {
                Ok(cn) => return Some(cn),
                Err(e) => warn!(error = %e, "idle connection replacement failed"),
            }
        }
    }

    /// Wait for a free connection. Returns `None` on timeout.
    async fn wait(&self) -> Option<Conn> {
        loop {
            let cn = self.free.pop_timeout(self.options.pool_timeout).await?;
            match self.refresh_idle(cn) {
                Ok(cn) => return Some(cn),
                Err(e) => warn!(error = %e, "idle connection replacement failed"),
            }
        }
    }

    async fn get(&self) -> PoolResult<(Conn, bool)> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(cn) = self.first() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((cn, false));
        }

        if self.conns.reserve()? {
            let cn = match self.dial() {
                Ok(cn) => cn,
                Err(e) => {
                    self.conns.release();
                    return Err(e);
                }
            };
            debug!(conn = cn.id(), total = self.conns.len(), "dialed new connection");
            // Closed while dialing: the connection has already been closed.
            self.conns.add(cn.clone())?;
            return Ok((cn, true));
        }

        self.counters.waits.fetch_add(1, Ordering::Relaxed);
        if let Some(cn) = self.wait().await {
            return Ok((cn, false));
        }

        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        Err(PoolError::Timeout)
    }

    /// Put and remove keep working while `close` drains, so in-flight
    /// callers can still hand connections back.
    fn is_shut_down(&self) -> bool {
        self.conns.is_closed()
    }

    fn put(&self, cn: Conn) -> PoolResult<()> {
        if self.is_shut_down() {
            return Err(PoolError::Closed);
        }

        let unread = cn.unread();
        if !unread.is_empty() {
            warn!(
                conn = cn.id(),
                unread = %String::from_utf8_lossy(&unread),
                "connection returned with unread data, discarding"
            );
            let err = PoolError::ProtocolDesync { unread };
            if let Err(remove_err) = self.remove(cn, &err.to_string()) {
                warn!(error = %remove_err, "replacing desynchronized connection failed");
            }
            return Err(err);
        }

        cn.touch();
        self.push_free(cn)
    }

    /// Push onto the free list unless the registry closed meanwhile. A push
    /// racing `close` is cleared here or by `close` itself, so nothing
    /// survives in the free list once the registry is closed.
    fn push_free(&self, cn: Conn) -> PoolResult<()> {
        self.free.push(cn);
        if self.is_shut_down() {
            self.free.clear();
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    fn remove(&self, cn: Conn, reason: &str) -> PoolResult<()> {
        if self.is_shut_down() {
            return Err(PoolError::Closed);
        }
        self.store_last_err(reason);

        // Push the replacement so a caller blocked in `wait` is woken even
        // though the connection it was waiting for is gone.
        let new_cn = self.replace(cn)?;
        self.push_free(new_cn)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            waits: self.counters.waits.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            total_conns: u32::try_from(self.conns.len()).unwrap_or(u32::MAX),
            free_conns: u32::try_from(self.free.len()).unwrap_or(u32::MAX),
        }
    }

    async fn close(&self) -> PoolResult<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoolError::Closed);
        }

        // Give checked-out connections a chance to come back before closing
        // everything. Drained connections stay registered and are closed below.
        let total = self.conns.len();
        let mut drained = 0;
        for _ in 0..total {
            if self.wait().await.is_none() {
                break;
            }
            drained += 1;
        }

        let result = self.conns.close();
        self.free.clear();
        info!(total, drained, "connection pool closed");
        result
    }
}

fn spawn_reaper(inner: &Arc<PoolInner>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime, idle connection reaper not started");
        return;
    };
    let pool: Weak<PoolInner> = Arc::downgrade(inner);
    runtime.spawn(async move {
        let start = tokio::time::Instant::now() + REAP_INTERVAL;
        let mut ticker = tokio::time::interval_at(start, REAP_INTERVAL);
        loop {
            ticker.tick().await;
            let Some(pool) = pool.upgrade() else { break };
            if pool.is_closed() {
                break;
            }
            // `first` replaces idle connections on the way out, so putting
            // the result straight back is all the sweep needs.
            if let Some(cn) = pool.first() {
                if let Err(e) = pool.put(cn) {
                    debug!(error = %e, "reaper could not return connection");
                }
            }
        }
        debug!("idle connection reaper stopped");
    });
}
