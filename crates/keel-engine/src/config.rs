//! Engine configuration loaded from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```
//! use keel_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "worker_threads": 2 }"#).unwrap();
//! assert_eq!(config.worker_threads, 2);
//! assert_eq!(config.log_filter, "warn");
//! ```

use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

/// Settings for a [`TickLoop`](crate::tick::TickLoop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Threads in the job pool producers schedule onto. At least one.
    pub worker_threads: usize,
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for EngineConfig {
    /// 60 Hz, four workers, warnings and above.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            worker_threads: 4,
            log_filter: "warn".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("malformed engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("invalid engine config {}", path.display()))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.fixed_dt > 0.0 && self.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            self.fixed_dt
        );
        ensure!(
            self.worker_threads >= 1,
            "worker_threads must be at least 1, got {}",
            self.worker_threads
        );
        Ok(())
    }
}
