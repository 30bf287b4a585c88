//! NodePools: one lazily created [`ConnPool`] per node address.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};
use warpgrid_pool::{ConnPool, Dialer, Pool, PoolError, PoolOptions, TcpDialer};

use crate::error::SlotsError;

/// Builds the dialer for a node address.
pub type DialerFactory = dyn Fn(&str) -> Arc<dyn Dialer> + Send + Sync;

/// Per-address pools sharing one set of options.
pub struct NodePools {
    options: PoolOptions,
    dialer_factory: Box<DialerFactory>,
    pools: RwLock<HashMap<String, Arc<ConnPool>>>,
    closed: AtomicBool,
}

impl NodePools {
    pub fn new<F>(options: PoolOptions, dialer_factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn Dialer> + Send + Sync + 'static,
    {
        Self {
            options,
            dialer_factory: Box::new(dialer_factory),
            pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Pools dialing plain TCP with the timeouts from `options`.
    pub fn tcp(options: PoolOptions) -> Self {
        let dial_options = options.clone();
        Self::new(options, move |addr: &str| -> Arc<dyn Dialer> {
            Arc::new(TcpDialer::from_options(addr, &dial_options))
        })
    }

    /// The pool for `addr`, creating it on first use.
    pub fn get_or_create(&self, addr: &str) -> Result<Arc<ConnPool>, SlotsError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed.into());
        }
        if let Some(pool) = self.pools.read().get(addr) {
            return Ok(Arc::clone(pool));
        }

        let mut pools = self.pools.write();
        // Re-check under the write lock; close may have drained the map.
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed.into());
        }
        let pool = pools.entry(addr.to_string()).or_insert_with(|| {
            debug!(addr, "creating node pool");
            let dialer = (self.dialer_factory)(addr);
            Arc::new(ConnPool::new(self.options.clone(), dialer))
        });
        Ok(Arc::clone(pool))
    }

    /// The pool for `addr` if one exists.
    pub fn get(&self, addr: &str) -> Option<Arc<ConnPool>> {
        self.pools.read().get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Addresses with a pool, sorted.
    pub fn addrs(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.pools.read().keys().cloned().collect();
        addrs.sort();
        addrs
    }

    /// Close every pool. Returns the first error; every pool is closed
    /// regardless. Later calls return `Closed`.
    pub async fn close_all(&self) -> Result<(), SlotsError> {
        let pools = {
            let mut pools = self.pools.write();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Err(PoolError::Closed.into());
            }
            std::mem::take(&mut *pools)
        };

        let total = pools.len();
        let mut first_err = None;
        for (addr, pool) in pools {
            if let Err(e) = pool.close().await {
                debug!(addr = %addr, error = %e, "node pool close failed");
                first_err.get_or_insert(e);
            }
        }
        info!(pools = total, "closed node pools");
        first_err.map_or(Ok(()), |e| Err(e.into()))
    }
}

impl std::fmt::Debug for NodePools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePools")
            .field("options", &self.options)
            .field("addrs", &self.addrs())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
