//! Slot routing error types.

use thiserror::Error;
use warpgrid_pool::PoolError;

/// Errors surfaced by the slot routing layer.
#[derive(Debug, Error)]
pub enum SlotsError {
    #[error("invalid redirect reply: {0:?}")]
    InvalidRedirect(String),

    #[error("cluster options list no seed addresses")]
    NoSeedAddresses,

    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
