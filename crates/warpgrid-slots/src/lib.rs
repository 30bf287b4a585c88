//! warpgrid-slots: cluster slot routing for WarpGrid key-value clients.
//!
//! - **hash**: key → slot mapping (CRC16 with `{hash tag}` support)
//! - **topology**: slot → node table, retry candidate iteration, and the
//!   coalescing reload flag
//! - **redirect**: `MOVED` / `ASK` reply parsing
//! - **node_pools**: one [`warpgrid_pool::ConnPool`] per node address
//! - **config**: seed addresses and per-node pool options
//!
//! Topology discovery itself is left to the caller; it feeds the discovered
//! [`SlotRange`]s into [`ClusterTopology::rebuild`].

pub mod config;
pub mod error;
pub mod hash;
pub mod node_pools;
pub mod redirect;
mod slot_map;
pub mod topology;

pub use config::ClusterOptions;
pub use error::SlotsError;
pub use hash::{HASH_SLOTS, key_slot};
pub use node_pools::{DialerFactory, NodePools};
pub use redirect::{Redirect, RedirectKind};
pub use slot_map::SlotRange;
pub use topology::{ClusterTopology, ReloadFlag};
