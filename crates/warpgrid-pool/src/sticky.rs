//! StickyConnPool: pins one connection from a backing pool for a session.
//!
//! Used when a sequence of commands must run on the same connection, such as
//! a MULTI/EXEC transaction. The pin is released exactly once, on close.
//!
//! ```text
//! Unbound ──get──▶ Bound(conn) ──close──▶ Closed
//!    ▲                  │
//!    └─────remove───────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::conn::Conn;
use crate::error::{PoolError, PoolResult};
use crate::pool::{Pool, PoolStats};

const NOT_REUSABLE: &str = "sticky connection is not reusable";

#[derive(Debug)]
enum StickyState {
    Unbound,
    Bound(Conn),
    Closed,
}

/// Session-scoped view of a backing pool holding at most one connection.
pub struct StickyConnPool<P: Pool> {
    pool: Arc<P>,
    reusable: bool,
    state: Mutex<StickyState>,
    /// Serializes binding so concurrent first `get`s check out one connection.
    bind: tokio::sync::Mutex<()>,
}

impl<P: Pool> StickyConnPool<P> {
    /// Wrap `pool`. When `reusable` is false the pinned connection is
    /// destroyed on close instead of being returned.
    pub fn new(pool: Arc<P>, reusable: bool) -> Self {
        Self {
            pool,
            reusable,
            state: Mutex::new(StickyState::Unbound),
            bind: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), StickyState::Closed)
    }

    fn bound(&self) -> PoolResult<Option<Conn>> {
        match &*self.state.lock() {
            StickyState::Unbound => Ok(None),
            StickyState::Bound(cn) => Ok(Some(cn.clone())),
            StickyState::Closed => Err(PoolError::Closed),
        }
    }
}

impl<P: Pool> Pool for StickyConnPool<P> {
    fn first(&self) -> Option<Conn> {
        self.bound().ok().flatten()
    }

    async fn get(&self) -> PoolResult<(Conn, bool)> {
        let _bind = self.bind.lock().await;
        if let Some(cn) = self.bound()? {
            return Ok((cn, false));
        }

        let (cn, is_new) = self.pool.get().await?;
        debug!(conn = cn.id(), "pinned sticky connection");
        *self.state.lock() = StickyState::Bound(cn.clone());
        Ok((cn, is_new))
    }

    /// Validates the connection; the pin is kept until close.
    ///
    /// # Panics
    ///
    /// Panics if `cn` is not the pinned connection.
    fn put(&self, cn: Conn) -> PoolResult<()> {
        match &*self.state.lock() {
            StickyState::Closed => Err(PoolError::Closed),
            StickyState::Bound(pinned) if *pinned == cn => Ok(()),
            StickyState::Bound(pinned) => panic!(
                "connection {} is not the pinned sticky connection {}",
                cn.id(),
                pinned.id()
            ),
            StickyState::Unbound => {
                panic!("connection {} returned to an unbound sticky pool", cn.id())
            }
        }
    }

    /// Destroys the pinned connection through the backing pool and unpins.
    ///
    /// # Panics
    ///
    /// Panics if no connection is pinned or `cn` is not the pinned one.
    fn remove(&self, cn: Conn, reason: &str) -> PoolResult<()> {
        let pinned = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, StickyState::Unbound) {
                StickyState::Bound(pinned) if pinned == cn => pinned,
                StickyState::Bound(pinned) => {
                    let pinned_id = pinned.id();
                    *state = StickyState::Bound(pinned);
                    panic!(
                        "connection {} is not the pinned sticky connection {pinned_id}",
                        cn.id()
                    );
                }
                StickyState::Unbound => {
                    panic!("connection {} removed from an unbound sticky pool", cn.id())
                }
                StickyState::Closed => {
                    *state = StickyState::Closed;
                    return Err(PoolError::Closed);
                }
            }
        };
        self.pool.remove(pinned, reason)
    }

    fn len(&self) -> usize {
        usize::from(matches!(*self.state.lock(), StickyState::Bound(_)))
    }

    fn free_len(&self) -> usize {
        usize::from(matches!(*self.state.lock(), StickyState::Unbound))
    }

    fn stats(&self) -> Option<PoolStats> {
        None
    }

    async fn close(&self) -> PoolResult<()> {
        let _bind = self.bind.lock().await;
        let previous = std::mem::replace(&mut *self.state.lock(), StickyState::Closed);
        match previous {
            StickyState::Closed => Err(PoolError::Closed),
            StickyState::Unbound => Ok(()),
            StickyState::Bound(cn) if self.reusable => self.pool.put(cn),
            StickyState::Bound(cn) => self.pool.remove(cn, NOT_REUSABLE),
        }
    }
}

impl<P: Pool> std::fmt::Debug for StickyConnPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickyConnPool")
            .field("reusable", &self.reusable)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
