//! warpgrid-pool: connection pooling for WarpGrid key-value clients.
//!
//! Provides three interchangeable [`Pool`] implementations:
//! - **ConnPool**: bounded per-node pool with idle replacement, a background
//!   reaper, rate-limited dialing, and blocking checkout with a timeout
//! - **SingleConnPool**: wraps one externally owned connection
//! - **StickyConnPool**: pins one connection from a backing pool for the
//!   length of a session (transactions, pipelines)
//!
//! Transports are plugged in through the [`Dialer`] and
//! [`ConnectionBackend`] traits; [`tcp`] provides the plain TCP one.

pub mod config;
pub mod conn;
pub mod error;
mod free_list;
mod limiter;
pub mod pool;
mod registry;
pub mod single;
pub mod sticky;
pub mod tcp;

pub use config::PoolOptions;
pub use conn::{Conn, ConnectionBackend, Dialer};
pub use error::{PoolError, PoolResult};
pub use pool::{ConnPool, Pool, PoolStats, REAP_INTERVAL};
pub use single::SingleConnPool;
pub use sticky::StickyConnPool;
pub use tcp::{TcpBackend, TcpDialer};
