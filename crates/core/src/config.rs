//! Agent configuration
//!
//! [`AgentConfig`] is an immutable value; [`ConfigService`] holds the current
//! one and swaps it on update. Schedulers call [`ConfigService::get`] at every
//! scheduling decision, so an update takes effect on the next tick without
//! restarting anything.
//!
//! ```toml
//! store_threshold_millis = 3000
//! stuck_threshold_seconds = 180
//!
//! [coarse]
//! initial_delay_millis = 1000
//! interval_millis = 500
//! total_seconds = 300
//!
//! [fine]
//! store_percentage = 5.0
//! interval_millis = 50
//! total_seconds = 10
//! ```

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Coarse profiling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseProfilingConfig {
    /// Elapsed time before a trace is first sampled
    pub initial_delay_millis: u64,
    /// Time between samples
    pub interval_millis: u64,
    /// Stop sampling a trace after it has run this long
    pub total_seconds: u64,
}

impl Default for CoarseProfilingConfig {
    fn default() -> Self {
        Self {
            initial_delay_millis: 1_000,
            interval_millis: 500,
            total_seconds: 300,
        }
    }
}

/// Fine profiling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineProfilingConfig {
    /// Percentage of traces selected at start, 0 to 100
    pub store_percentage: f64,
    /// Time between samples of a selected trace
    pub interval_millis: u64,
    /// Stop sampling a trace after it has run this long
    pub total_seconds: u64,
}

impl Default for FineProfilingConfig {
    fn default() -> Self {
        Self {
            store_percentage: 0.0,
            interval_millis: 50,
            total_seconds: 10,
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch for trace capture
    pub enabled: bool,
    /// Completed traces shorter than this are dropped unless stuck, errored
    /// or fine-profiled
    pub store_threshold_millis: u64,
    /// Active traces running longer than this are flagged stuck
    pub stuck_threshold_seconds: u64,
    /// How often the stuck collector scans active traces
    pub stuck_check_interval_millis: u64,
    /// Coarse profiler settings
    pub coarse: CoarseProfilingConfig,
    /// Fine profiler settings
    pub fine: FineProfilingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_threshold_millis: 3_000,
            stuck_threshold_seconds: 180,
            stuck_check_interval_millis: 1_000,
            coarse: CoarseProfilingConfig::default(),
            fine: FineProfilingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the schedulers cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.fine.store_percentage) {
            return Err(Error::Config(format!(
                "fine.store_percentage must be within 0..=100, got {}",
                self.fine.store_percentage
            )));
        }
        if self.stuck_check_interval_millis == 0 {
            return Err(Error::Config("stuck_check_interval_millis must be > 0".into()));
        }
        if self.coarse.interval_millis == 0 {
            return Err(Error::Config("coarse.interval_millis must be > 0".into()));
        }
        if self.fine.interval_millis == 0 {
            return Err(Error::Config("fine.interval_millis must be > 0".into()));
        }
        Ok(())
    }

    /// Store threshold in nanoseconds
    pub fn store_threshold_nanos(&self) -> u64 {
        self.store_threshold_millis.saturating_mul(1_000_000)
    }

    /// Stuck threshold in nanoseconds
    pub fn stuck_threshold_nanos(&self) -> u64 {
        self.stuck_threshold_seconds.saturating_mul(1_000_000_000)
    }

    /// Stuck collector scan period
    pub fn stuck_check_interval(&self) -> Duration {
        Duration::from_millis(self.stuck_check_interval_millis)
    }
}

/// Holder of the current configuration
#[derive(Debug)]
pub struct ConfigService {
    current: RwLock<Arc<AgentConfig>>,
}

impl ConfigService {
    /// Create from an initial configuration
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Current configuration
    ///
    /// The returned snapshot stays valid after later updates.
    pub fn get(&self) -> Arc<AgentConfig> {
        self.current.read().clone()
    }

    /// Replace the configuration
    pub fn update(&self, config: AgentConfig) -> Result<()> {
        config.validate()?;
        *self.current.write() = Arc::new(config);
        info!("agent configuration updated");
        Ok(())
    }

    /// Re-read configuration from a TOML file
    ///
    /// On error the current configuration is kept.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = AgentConfig::from_file(path)?;
        self.update(config)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(AgentConfig::default())),
        }
    }
}
