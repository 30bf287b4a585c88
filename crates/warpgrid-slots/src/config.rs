//! ClusterOptions: seed addresses plus the per-node pool settings.
//!
//! ```toml
//! addrs = ["10.0.0.1:7000", "10.0.0.2:7000"]
//!
//! [pool]
//! pool_size = 16
//! idle_timeout_ms = 300000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use warpgrid_pool::PoolOptions;

use crate::error::SlotsError;
use crate::redirect::is_node_addr;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Seed node addresses (`host:port`).
    pub addrs: Vec<String>,
    /// Options applied to every node's pool.
    #[serde(default)]
    pub pool: PoolOptions,
}

impl ClusterOptions {
    pub fn new<S: Into<String>>(addrs: impl IntoIterator<Item = S>) -> Self {
        Self {
            addrs: addrs.into_iter().map(Into::into).collect(),
            pool: PoolOptions::default(),
        }
    }

    /// Builder method: set the per-node pool options.
    pub fn with_pool(self, pool: PoolOptions) -> Self {
        Self { pool, ..self }
    }

    /// Parse and validate options from a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let options: ClusterOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Require at least one seed and well-formed addresses.
    pub fn validate(&self) -> Result<(), SlotsError> {
        if self.addrs.is_empty() {
            return Err(SlotsError::NoSeedAddresses);
        }
        match self.addrs.iter().find(|addr| !is_node_addr(addr)) {
            Some(addr) => Err(SlotsError::InvalidAddress(addr.clone())),
            None => Ok(()),
        }
    }
}
