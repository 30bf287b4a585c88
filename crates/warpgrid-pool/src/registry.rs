//! Registry of every connection a pool owns, usable or not.
//!
//! Capacity is accounted optimistically: a caller reserves a place with an
//! atomic increment, dials without holding any lock, and then either adds
//! the new connection or releases the reservation. `size` may therefore
//! briefly exceed the number of members, never `max`.
//!
//! Every change to `size` happens under the members lock, so closing the
//! registry and resetting `size` is atomic with respect to reservations that
//! are still dialing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::conn::Conn;
use crate::error::{PoolError, PoolResult};

pub(crate) struct ConnRegistry {
    /// `None` once the registry has been closed.
    members: Mutex<Option<HashMap<u64, Conn>>>,
    size: AtomicUsize,
    max: usize,
}

impl ConnRegistry {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            members: Mutex::new(Some(HashMap::with_capacity(max))),
            size: AtomicUsize::new(0),
            max,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.members.lock().is_none()
    }

    /// Reserve a place for a connection about to be dialed. The caller must
    /// follow up with [`add`](Self::add) or [`release`](Self::release).
    ///
    /// Returns `Ok(false)` when the registry is full.
    pub(crate) fn reserve(&self) -> PoolResult<bool> {
        let members = self.members.lock();
        if members.is_none() {
            return Err(PoolError::Closed);
        }
        let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
        if size > self.max {
            self.size.fetch_sub(1, Ordering::AcqRel);
            return Ok(false);
        }
        Ok(true)
    }

    /// Give back a reservation whose dial failed. A no-op once closed, since
    /// closing already dropped every reservation.
    pub(crate) fn release(&self) {
        if self.members.lock().is_some() {
            self.size.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Register a connection into a previously reserved place.
    ///
    /// If the registry was closed while the dial was in flight, the
    /// connection is closed and `Closed` is returned.
    pub(crate) fn add(&self, cn: Conn) -> PoolResult<()> {
        let mut members = self.members.lock();
        match members.as_mut() {
            Some(members) => {
                members.insert(cn.id(), cn);
                Ok(())
            }
            None => {
                drop(members);
                let _ = cn.close();
                Err(PoolError::Closed)
            }
        }
    }

    /// Drop a connection from the registry and close it.
    ///
    /// # Panics
    ///
    /// Panics if the connection was never registered with this pool.
    pub(crate) fn remove(&self, cn: &Conn) -> PoolResult<()> {
        let mut members = self.members.lock();
        let Some(members) = members.as_mut() else {
            return Ok(());
        };
        if members.remove(&cn.id()).is_none() {
            panic!("connection {} is not registered with this pool", cn.id());
        }
        self.size.fetch_sub(1, Ordering::AcqRel);
        cn.close().map_err(PoolError::Close)
    }

    /// Swap `old` for `new` in place and close `old`.
    ///
    /// Once closed, `new` is closed instead and `Closed` is returned.
    ///
    /// # Panics
    ///
    /// Panics if `old` was never registered with this pool.
    pub(crate) fn replace(&self, old: &Conn, new: Conn) -> PoolResult<()> {
        let mut members = self.members.lock();
        let Some(members) = members.as_mut() else {
            let _ = new.close();
            return Err(PoolError::Closed);
        };
        if members.remove(&old.id()).is_none() {
            panic!("connection {} is not registered with this pool", old.id());
        }
        members.insert(new.id(), new);
        old.close().map_err(PoolError::Close)
    }

    /// Close every registered connection, including ones still checked out.
    /// Returns the first close error; all connections are closed regardless.
    pub(crate) fn close(&self) -> PoolResult<()> {
        let members = {
            let mut guard = self.members.lock();
            self.size.store(0, Ordering::Release);
            guard.take().unwrap_or_default()
        };

        let mut first_err = None;
        for cn in members.into_values() {
            if let Err(e) = cn.close() {
                first_err.get_or_insert(PoolError::Close(e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
