//! Composition root
//!
//! [`TraceModule::start`] builds the tiers, starts the writer and timer
//! threads and schedules the background scans. [`TraceModule::close`] stops
//! them in reverse order; it is idempotent and also runs on drop.

use crate::coarse::CoarseProfiler;
use crate::collector::TraceCollector;
use crate::fine::FineProfileScheduler;
use crate::plugin::{PluginContext, PluginServiceRegistry, PluginServices};
use crate::query::{TracePoints, TraceQueryEngine};
use crate::sampler::{EntryStackSampler, StackSampler};
use crate::stuck::StuckTraceCollector;
use crate::timer::Timer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tierscope_core::{
    Clock, ConfigService, MonotonicTicker, QueryFilter, Result, SystemClock, Ticker,
};
use tierscope_durability::{DurableTraceStore, InMemoryTraceStore, TraceWriter};
use tierscope_storage::{MetricNameCache, PendingTraceSink, TraceRegistry};
use tracing::info;

/// Collaborators injected into a [`TraceModule`]
#[derive(Debug, Clone)]
pub struct ModuleOptions {
    /// Wall-clock source
    pub clock: Arc<dyn Clock>,
    /// Monotonic source for durations
    pub ticker: Arc<dyn Ticker>,
    /// Live configuration
    pub config: Arc<ConfigService>,
    /// Durable tier
    pub store: Arc<dyn DurableTraceStore>,
    /// Stack capture for both profilers
    pub sampler: Arc<dyn StackSampler>,
    /// Seed for fine-profiling selection; entropy when `None`
    pub fine_seed: Option<u64>,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ticker: Arc::new(MonotonicTicker::new()),
            config: Arc::new(ConfigService::default()),
            store: Arc::new(InMemoryTraceStore::new()),
            sampler: Arc::new(EntryStackSampler),
            fine_seed: None,
        }
    }
}

/// Owns every tier and background thread of the agent
#[derive(Debug)]
pub struct TraceModule {
    config: Arc<ConfigService>,
    registry: Arc<TraceRegistry>,
    pending: Arc<PendingTraceSink>,
    store: Arc<dyn DurableTraceStore>,
    writer: Arc<TraceWriter>,
    timer: Arc<Timer>,
    collector: Arc<TraceCollector>,
    stuck: Arc<StuckTraceCollector>,
    coarse: Arc<CoarseProfiler>,
    fine: Arc<FineProfileScheduler>,
    plugins: PluginServiceRegistry,
    query: TraceQueryEngine,
    closed: AtomicBool,
}

impl TraceModule {
    /// Build the module and start its threads
    ///
    /// # Errors
    ///
    /// I/O error if a background thread cannot be spawned.
    pub fn start(options: ModuleOptions) -> Result<Self> {
        let ModuleOptions {
            clock,
            ticker,
            config,
            store,
            sampler,
            fine_seed,
        } = options;

        let registry = Arc::new(TraceRegistry::new());
        let pending = Arc::new(PendingTraceSink::new());
        let writer = Arc::new(TraceWriter::start(Arc::clone(&store), Arc::clone(&pending))?);
        let timer = Arc::new(Timer::start("tierscope-timer")?);

        let collector = Arc::new(TraceCollector::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&config),
            Arc::clone(&clock),
            Arc::clone(&ticker),
        ));
        let stuck = Arc::new(StuckTraceCollector::new(
            Arc::clone(&registry),
            Arc::clone(&collector),
            Arc::clone(&config),
            Arc::clone(&ticker),
        ));
        let coarse = Arc::new(CoarseProfiler::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&ticker),
            Arc::clone(&sampler),
        ));
        let rng = match fine_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let fine = Arc::new(FineProfileScheduler::with_rng(
            Arc::clone(&timer),
            Arc::clone(&config),
            Arc::clone(&ticker),
            sampler,
            rng,
        ));
        let plugins = PluginServiceRegistry::new(PluginContext {
            registry: Arc::clone(&registry),
            collector: Arc::clone(&collector),
            fine: Arc::clone(&fine),
            metric_names: Arc::new(MetricNameCache::new()),
            config: Arc::clone(&config),
            clock: Arc::clone(&clock),
            ticker: Arc::clone(&ticker),
        });
        let query = TraceQueryEngine::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            Arc::clone(&store),
            Arc::clone(&collector),
            clock,
            ticker,
        );

        stuck.start(&timer);
        coarse.start(&timer);
        info!("trace module started");

        Ok(Self {
            config,
            registry,
            pending,
            store,
            writer,
            timer,
            collector,
            stuck,
            coarse,
            fine,
            plugins,
            query,
            closed: AtomicBool::new(false),
        })
    }

    /// Services for `plugin_id`, constructed once
    pub fn plugin_services(&self, plugin_id: &str) -> Arc<PluginServices> {
        self.plugins.get(plugin_id)
    }

    /// Cache of plugin services
    pub fn plugins(&self) -> &PluginServiceRegistry {
        &self.plugins
    }

    /// Points query across all tiers; see [`TraceQueryEngine::query_points`]
    pub fn query_points(&self, filter: &QueryFilter) -> Result<TracePoints> {
        self.query.query_points(filter)
    }

    /// Live configuration
    pub fn config(&self) -> &Arc<ConfigService> {
        &self.config
    }

    /// Active tier
    pub fn registry(&self) -> &Arc<TraceRegistry> {
        &self.registry
    }

    /// Pending tier
    pub fn pending(&self) -> &Arc<PendingTraceSink> {
        &self.pending
    }

    /// Durable tier
    pub fn store(&self) -> &Arc<dyn DurableTraceStore> {
        &self.store
    }

    /// Completion pipeline
    pub fn collector(&self) -> &Arc<TraceCollector> {
        &self.collector
    }

    /// Stuck trace scan
    pub fn stuck_collector(&self) -> &Arc<StuckTraceCollector> {
        &self.stuck
    }

    /// Coarse profiler
    pub fn coarse_profiler(&self) -> &Arc<CoarseProfiler> {
        &self.coarse
    }

    /// Fine profiling selector
    pub fn fine_scheduler(&self) -> &Arc<FineProfileScheduler> {
        &self.fine
    }

    /// Block until every queued durable write has been applied
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Stop background work and drain the writer
    ///
    /// Traces still active are not persisted. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fine.close();
        self.coarse.close();
        self.stuck.close();
        self.timer.shutdown();
        self.writer.shutdown();
        info!(
            active = self.registry.len(),
            pending = self.pending.len(),
            "trace module closed"
        );
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TraceModule {
    fn drop(&mut self) {
        self.close();
    }
}
