//! LIFO stack of idle connections.
//!
//! Availability is signalled through a semaphore while the stack itself sits
//! behind a separate mutex, so waiting for a connection never contends with
//! pushing or popping one. The semaphore holds exactly one permit per stacked
//! connection.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::conn::Conn;

pub(crate) struct FreeList {
    conns: Mutex<Vec<Conn>>,
    available: Semaphore,
}

impl FreeList {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            conns: Mutex::new(Vec::with_capacity(capacity)),
            available: Semaphore::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.available.available_permits()
    }

    pub(crate) fn push(&self, cn: Conn) {
        self.conns.lock().push(cn);
        self.available.add_permits(1);
    }

    /// Pop the most recently pushed connection without waiting.
    pub(crate) fn pop(&self) -> Option<Conn> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.take()
    }

    /// Pop, waiting up to `timeout` for a connection to be pushed.
    pub(crate) async fn pop_timeout(&self, timeout: Duration) -> Option<Conn> {
        let permit = tokio::time::timeout(timeout, self.available.acquire())
            .await
            .ok()?
            .ok()?;
        permit.forget();
        self.take()
    }

    /// Drop every stacked connection.
    pub(crate) fn clear(&self) {
        while self.pop().is_some() {}
    }

    fn take(&self) -> Option<Conn> {
        self.conns.lock().pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::mock;
    use std::sync::Arc;

    #[test]
    fn pops_in_lifo_order() {
        let list = FreeList::new(3);
        let a = mock::conn();
        let b = mock::conn();
        list.push(a.clone());
        list.push(b.clone());
        assert_eq!(list.len(), 2);

        assert_eq!(list.pop(), Some(b));
        assert_eq!(list.pop(), Some(a));
        assert_eq!(list.pop(), None);
        assert_eq!(list.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_timeout_expires_when_empty() {
        let list = FreeList::new(1);
        assert!(list.pop_timeout(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn pop_timeout_wakes_on_push() {
        let list = Arc::new(FreeList::new(1));
        let waiter = {
            let list = Arc::clone(&list);
            tokio::spawn(async move { list.pop_timeout(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let cn = mock::conn();
        list.push(cn.clone());

        assert_eq!(waiter.await.unwrap(), Some(cn));
        assert_eq!(list.len(), 0);
    }
}
