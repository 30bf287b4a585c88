//! PoolOptions: per-node connection pool settings.
//!
//! Options are usually embedded in a larger client config, but can be read
//! standalone from TOML. Durations are written as integer milliseconds:
//!
//! ```toml
//! pool_size = 20
//! pool_timeout_ms = 2000
//! idle_timeout_ms = 300000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a single [`ConnPool`](crate::ConnPool).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum connections the pool may own (default: 10).
    pub pool_size: usize,
    /// Maximum time `get` waits for a free connection once the pool is at
    /// capacity (default: 5s).
    #[serde(rename = "pool_timeout_ms", with = "duration_ms")]
    pub pool_timeout: Duration,
    /// Connections unused for longer than this are replaced on checkout and
    /// by the background reaper. `None` disables both (default).
    #[serde(rename = "idle_timeout_ms", with = "opt_duration_ms")]
    pub idle_timeout: Option<Duration>,
    /// Dial attempts allowed per second. Defaults to three times `pool_size`.
    pub dial_rate: Option<u32>,
    /// TCP connect timeout used by [`TcpDialer`](crate::tcp::TcpDialer) (default: 5s).
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Socket read timeout used by [`TcpDialer`](crate::tcp::TcpDialer) (default: 3s).
    #[serde(rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_timeout: Duration::from_secs(5),
            idle_timeout: None,
            dial_rate: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
        }
    }
}

impl PoolOptions {
    /// Options with the given capacity and defaults elsewhere.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }

    /// Parse options from a TOML document.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let options: PoolOptions = toml::from_str(content)?;
        Ok(options)
    }

    /// Read options from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Capacity, never less than one.
    pub fn capacity(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Effective dial rate per second.
    pub fn dial_rate(&self) -> u32 {
        self.dial_rate
            .unwrap_or_else(|| u32::try_from(self.capacity() * 3).unwrap_or(u32::MAX))
            .max(1)
    }

    /// Builder method: set the pool wait timeout.
    pub fn with_pool_timeout(self, pool_timeout: Duration) -> Self {
        Self {
            pool_timeout,
            ..self
        }
    }

    /// Builder method: enable idle replacement with the given timeout.
    pub fn with_idle_timeout(self, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(idle_timeout),
            ..self
        }
    }

    /// Builder method: override the dial rate.
    pub fn with_dial_rate(self, dial_rate: u32) -> Self {
        Self {
            dial_rate: Some(dial_rate),
            ..self
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        // Zero means disabled, same as leaving the key out.
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = PoolOptions::default();
        assert_eq!(options.pool_size, 10);
        assert_eq!(options.pool_timeout, Duration::from_secs(5));
        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.dial_rate(), 30);
    }

    #[test]
    fn dial_rate_tracks_capacity() {
        assert_eq!(PoolOptions::new(2).dial_rate(), 6);
        assert_eq!(PoolOptions::new(2).with_dial_rate(1).dial_rate(), 1);
        assert_eq!(PoolOptions::new(0).capacity(), 1);
    }

    #[test]
    fn parses_toml_with_millisecond_durations() {
        let options = PoolOptions::from_toml_str(
            r#"
            pool_size = 4
            pool_timeout_ms = 250
            idle_timeout_ms = 60000
            "#,
        )
        .unwrap();

        assert_eq!(options.pool_size, 4);
        assert_eq!(options.pool_timeout, Duration::from_millis(250));
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(60)));
        // Unspecified keys keep their defaults.
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_idle_timeout_disables_reaping() {
        let options = PoolOptions::from_toml_str("idle_timeout_ms = 0").unwrap();
        assert_eq!(options.idle_timeout, None);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(PoolOptions::from_toml_str("pool_size = \"many\"").is_err());
    }

    #[test]
    fn builder_methods_chain() {
        let options = PoolOptions::new(3)
            .with_pool_timeout(Duration::from_millis(10))
            .with_idle_timeout(Duration::from_secs(1));
        assert_eq!(options.pool_size, 3);
        assert_eq!(options.pool_timeout, Duration::from_millis(10));
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn serializes_back_to_toml() {
        let options = PoolOptions::new(7).with_idle_timeout(Duration::from_secs(2));
        let text = toml::to_string(&options).unwrap();
        assert!(text.contains("pool_size = 7"));
        assert!(text.contains("idle_timeout_ms = 2000"));
        assert_eq!(PoolOptions::from_toml_str(&text).unwrap(), options);
    }
}
