//! Per-plugin instrumentation facade
//!
//! Instrumentation code never touches the tiers directly. It asks the
//! [`PluginServiceRegistry`] for its [`PluginServices`] once and drives
//! traces through it:
//!
//! ```text
//! let services = registry.get("servlet");
//! let trace = services.begin_trace("GET /orders", false)?;
//! let entry = services.start_entry(&trace, "SELECT orders");
//! services.end_entry(&trace, entry);
//! services.complete_trace(&trace);
//! ```

use crate::collector::TraceCollector;
use crate::fine::FineProfileScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tierscope_core::{
    Clock, ConfigService, EntryId, MetricNameHandle, Result, Ticker, Trace, TraceId, TraceMetric,
};
use tierscope_storage::{MetricNameCache, OnceMap, TraceRegistry};
use tracing::debug;

/// Everything a [`PluginServices`] needs, shared across plugins
#[derive(Debug, Clone)]
pub(crate) struct PluginContext {
    pub(crate) registry: Arc<TraceRegistry>,
    pub(crate) collector: Arc<TraceCollector>,
    pub(crate) fine: Arc<FineProfileScheduler>,
    pub(crate) metric_names: Arc<MetricNameCache>,
    pub(crate) config: Arc<ConfigService>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ticker: Arc<dyn Ticker>,
}

/// Instrumentation API bound to one plugin id
#[derive(Debug)]
pub struct PluginServices {
    plugin_id: String,
    ctx: PluginContext,
}

impl PluginServices {
    pub(crate) fn new(plugin_id: impl Into<String>, ctx: PluginContext) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ctx,
        }
    }

    /// Plugin id these services are bound to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Whether trace capture is switched on
    ///
    /// Instrumentation should check this before starting a trace.
    pub fn is_enabled(&self) -> bool {
        self.ctx.config.get().enabled
    }

    /// Shared handle for a metric name of this plugin
    pub fn metric_name(&self, name: &str) -> MetricNameHandle {
        self.ctx.metric_names.get(&self.plugin_id, name)
    }

    /// Start and register a new trace
    ///
    /// The trace may be selected for fine profiling here.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateId`](tierscope_core::Error::DuplicateId) if the
    /// generated id collides with a registered trace.
    pub fn begin_trace(&self, message: impl Into<String>, background: bool) -> Result<Arc<Trace>> {
        let trace = Arc::new(Trace::new(
            TraceId::new(),
            message,
            background,
            self.ctx.clock.current_time_millis(),
            self.ctx.ticker.read(),
        ));
        self.ctx.registry.register(Arc::clone(&trace))?;
        self.ctx.fine.maybe_schedule(&trace);
        debug!(plugin = %self.plugin_id, trace_id = %trace.id(), background, "trace started");
        Ok(trace)
    }

    /// Open a nested entry at the current tick
    pub fn start_entry(&self, trace: &Trace, message: impl Into<String>) -> EntryId {
        trace.start_entry(message, self.ctx.ticker.read())
    }

    /// Close an entry at the current tick
    pub fn end_entry(&self, trace: &Trace, entry: EntryId) {
        trace.end_entry(entry, self.ctx.ticker.read());
    }

    /// Record an entry whose timing is already known
    pub fn append_entry(
        &self,
        trace: &Trace,
        message: impl Into<String>,
        start_tick: u64,
        end_tick: u64,
    ) -> EntryId {
        trace.append_entry(message, start_tick, end_tick)
    }

    /// Start timing `name` on `trace`
    pub fn start_timer(&self, trace: &Trace, name: &MetricNameHandle) -> MetricTimer {
        MetricTimer {
            metric: trace.metric(name),
            start_tick: self.ctx.ticker.read(),
            ticker: Arc::clone(&self.ctx.ticker),
        }
    }

    /// Record an error on `trace`
    pub fn set_error(&self, trace: &Trace, message: Option<String>) {
        trace.set_error(message);
    }

    /// Attach a user id to `trace`; an empty string clears it
    pub fn set_user_id(&self, trace: &Trace, user_id: impl Into<String>) {
        trace.set_user_id(user_id);
    }

    /// Finish `trace` and hand it to the completion pipeline
    ///
    /// Returns whether the trace was queued for storage. Completing a trace
    /// twice is a no-op.
    pub fn complete_trace(&self, trace: &Arc<Trace>) -> bool {
        if !trace.complete(self.ctx.ticker.read()) {
            debug!(trace_id = %trace.id(), "trace already completed");
            return false;
        }
        self.ctx.collector.on_complete(trace)
    }
}

/// Running timer of one metric on one trace
#[must_use = "a metric timer records nothing until stopped"]
#[derive(Debug)]
pub struct MetricTimer {
    metric: Arc<TraceMetric>,
    start_tick: u64,
    ticker: Arc<dyn Ticker>,
}

impl MetricTimer {
    /// Record the elapsed time and return it in nanoseconds
    pub fn stop(self) -> u64 {
        let elapsed = self.ticker.read().saturating_sub(self.start_tick);
        self.metric.record(elapsed);
        elapsed
    }
}

/// Compute-once cache of [`PluginServices`] keyed by plugin id
///
/// Concurrent first requests for one id construct a single instance.
#[derive(Debug)]
pub struct PluginServiceRegistry {
    services: OnceMap<String, Arc<PluginServices>>,
    ctx: PluginContext,
    constructed: AtomicUsize,
    // ids in construction order, for diagnostics
    order: Mutex<Vec<String>>,
}

impl PluginServiceRegistry {
    pub(crate) fn new(ctx: PluginContext) -> Self {
        Self {
            services: OnceMap::new(),
            ctx,
            constructed: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Services for `plugin_id`, constructed on first request
    pub fn get(&self, plugin_id: &str) -> Arc<PluginServices> {
        self.services.get_or_init(plugin_id, || {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(plugin_id.to_string());
            debug!(plugin = plugin_id, "plugin services created");
            Arc::new(PluginServices::new(plugin_id, self.ctx.clone()))
        })
    }

    /// Number of instances constructed so far
    pub fn constructed_count(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Plugin ids in the order their services were constructed
    pub fn plugin_ids(&self) -> Vec<String> {
        self.order.lock().clone()
    }
}
