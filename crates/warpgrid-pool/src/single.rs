//! Pool of exactly one externally owned connection.

use crate::conn::Conn;
use crate::error::PoolResult;
use crate::pool::{Pool, PoolStats};

/// Wraps a connection the caller already owns so it can be used anywhere a
/// [`Pool`] is expected. Closing the pool leaves the connection open.
#[derive(Clone, Debug)]
pub struct SingleConnPool {
    cn: Conn,
}

impl SingleConnPool {
    pub fn new(cn: Conn) -> Self {
        Self { cn }
    }

    /// The wrapped connection.
    pub fn conn(&self) -> &Conn {
        &self.cn
    }

    fn assert_same(&self, cn: &Conn) {
        assert!(
            *cn == self.cn,
            "connection {} does not belong to single-connection pool holding {}",
            cn.id(),
            self.cn.id()
        );
    }
}

impl Pool for SingleConnPool {
    fn first(&self) -> Option<Conn> {
        Some(self.cn.clone())
    }

    async fn get(&self) -> PoolResult<(Conn, bool)> {
        Ok((self.cn.clone(), false))
    }

    /// # Panics
    ///
    /// Panics if `cn` is not the wrapped connection.
    fn put(&self, cn: Conn) -> PoolResult<()> {
        self.assert_same(&cn);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `cn` is not the wrapped connection.
    fn remove(&self, cn: Conn, _reason: &str) -> PoolResult<()> {
        self.assert_same(&cn);
        Ok(())
    }

    fn len(&self) -> usize {
        1
    }

    fn free_len(&self) -> usize {
        0
    }

    fn stats(&self) -> Option<PoolStats> {
        None
    }

    async fn close(&self) -> PoolResult<()> {
        Ok(())
    }
}
