//! Main agent entry point for tierscope.
//!
//! This module provides the `Agent` struct, the primary entry point for
//! instrumentation and for the points query.

use crate::api::{self, PointsResponse};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tierscope_core::{AgentConfig, Clock, ConfigService, QueryFilter, Ticker};
use tierscope_durability::DurableTraceStore;
use tierscope_engine::{ModuleOptions, PluginServices, StackSampler, TraceModule, TracePoints};
use tracing::{debug, warn};

/// The tierscope agent.
///
/// Owns the trace tiers and the background threads. Create one with
/// [`Agent::in_memory`] or [`Agent::builder`].
///
/// # Example
///
/// ```ignore
/// use tierscope::prelude::*;
///
/// let agent = Agent::builder().config_file("agent.toml").start()?;
///
/// let servlet = agent.plugin_services("servlet");
/// let trace = servlet.begin_trace("GET /orders", false)?;
/// servlet.complete_trace(&trace);
///
/// let response = agent.handle_points_request(r#"{"from": -60000, "limit": 100}"#);
///
/// agent.close();
/// ```
#[derive(Debug)]
pub struct Agent {
    module: TraceModule,
}

impl Agent {
    /// Start an agent with default settings and an in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::builder().start()
    }

    /// Create a builder for agent configuration.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Instrumentation services for `plugin_id`.
    ///
    /// Every call with the same id returns the same instance.
    pub fn plugin_services(&self, plugin_id: &str) -> Arc<PluginServices> {
        self.module.plugin_services(plugin_id)
    }

    /// Points matching `filter` across the active, pending and stored tiers.
    pub fn query_points(&self, filter: &QueryFilter) -> Result<TracePoints> {
        self.module.query_points(filter).map_err(Error::from)
    }

    /// Answer a JSON points request.
    ///
    /// Never fails: a malformed request yields an empty `ok` response and a
    /// tier failure an `error` response.
    pub fn handle_points_request(&self, body: &str) -> PointsResponse {
        debug!(request = body, "points request");
        let filter = match api::parse_filter(body) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(error = %e, "malformed points request");
                return PointsResponse::empty();
            }
        };
        match self.query_points(&filter) {
            Ok(points) => PointsResponse::ok(points),
            Err(e) => {
                warn!(error = %e, "points query failed");
                PointsResponse::error(e.to_string())
            }
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<AgentConfig> {
        self.module.config().get()
    }

    /// Replace the configuration.
    ///
    /// Schedulers pick up the new values at their next run.
    pub fn update_config(&self, config: AgentConfig) -> Result<()> {
        self.module.config().update(config).map_err(Error::from)
    }

    /// Re-read the configuration from a TOML file.
    ///
    /// On error the current configuration is kept.
    pub fn reload_config(&self, path: impl AsRef<Path>) -> Result<()> {
        self.module.config().reload(path).map_err(Error::from)
    }

    /// Block until every queued durable write has been applied.
    pub fn flush(&self) {
        self.module.flush();
    }

    /// Stop background work and drain the durability writer.
    ///
    /// Traces still active are not persisted. Idempotent.
    pub fn close(&self) {
        self.module.close();
    }

    /// Get agent metrics.
    pub fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            active_traces: self.module.registry().len(),
            pending_traces: self.module.pending().len(),
            traces_stored: self.module.collector().stored_count(),
            traces_discarded: self.module.collector().discarded_count(),
        }
    }

    /// Underlying trace module.
    pub fn module(&self) -> &TraceModule {
        &self.module
    }
}

/// Agent metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentMetrics {
    /// Traces currently executing
    pub active_traces: usize,
    /// Completed traces not yet durably stored
    pub pending_traces: usize,
    /// Completed traces queued for storage
    pub traces_stored: u64,
    /// Completed traces discarded below the store threshold
    pub traces_discarded: u64,
}

/// Builder for agent configuration.
///
/// # Example
///
/// ```ignore
/// // Production: system clocks, configuration file
/// let agent = Agent::builder()
///     .config_file("/etc/tierscope/agent.toml")
///     .store(Arc::new(my_store))
///     .start()?;
///
/// // Tests: manual time, fixed sampling seed
/// let agent = Agent::builder()
///     .clock(clock.clone())
///     .ticker(ticker.clone())
///     .fine_seed(42)
///     .start()?;
/// ```
#[derive(Debug, Default)]
pub struct AgentBuilder {
    config: Option<AgentConfig>,
    config_path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    ticker: Option<Arc<dyn Ticker>>,
    store: Option<Arc<dyn DurableTraceStore>>,
    sampler: Option<Arc<dyn StackSampler>>,
    fine_seed: Option<u64>,
}

impl AgentBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from a TOML file at start.
    ///
    /// Takes precedence over [`config`](Self::config).
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Wall-clock source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Monotonic source for durations.
    pub fn ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// Durable tier; in-memory by default.
    pub fn store(mut self, store: Arc<dyn DurableTraceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Stack capture for the profilers.
    pub fn sampler(mut self, sampler: Arc<dyn StackSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Fixed seed for fine-profiling selection.
    pub fn fine_seed(mut self, seed: u64) -> Self {
        self.fine_seed = Some(seed);
        self
    }

    /// Start the agent.
    ///
    /// # Errors
    ///
    /// Configuration errors, or I/O errors spawning background threads.
    pub fn start(self) -> Result<Agent> {
        let config = match (&self.config_path, self.config) {
            (Some(path), _) => AgentConfig::from_file(path)?,
            (None, Some(config)) => config,
            (None, None) => AgentConfig::default(),
        };
        let defaults = ModuleOptions::default();
        let options = ModuleOptions {
            clock: self.clock.unwrap_or(defaults.clock),
            ticker: self.ticker.unwrap_or(defaults.ticker),
            config: Arc::new(ConfigService::new(config)?),
            store: self.store.unwrap_or(defaults.store),
            sampler: self.sampler.unwrap_or(defaults.sampler),
            fine_seed: self.fine_seed,
        };
        let module = TraceModule::start(options)?;
        Ok(Agent { module })
    }
}
