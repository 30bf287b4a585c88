//! Pool error types.

use thiserror::Error;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by pool operations.
///
/// Caller-contract violations (returning a connection the pool does not own,
/// identity mismatches in single/sticky pools) are not represented here:
/// they panic, because no caller can meaningfully recover from them.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is closed")]
    Closed,

    #[error("connection pool timeout")]
    Timeout,

    #[error("dialing connections too fast (last_error={last_error:?})")]
    DialRateLimited { last_error: String },

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("connection has unread data: {}", String::from_utf8_lossy(.unread))]
    ProtocolDesync { unread: Vec<u8> },

    #[error("close failed: {0}")]
    Close(String),
}

impl PoolError {
    /// Whether retrying against the same pool may succeed.
    ///
    /// Used by the routing layer to decide between waiting on this node and
    /// moving on to the next candidate address.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::DialRateLimited { .. })
    }
}
