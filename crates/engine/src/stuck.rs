//! Periodic detection of traces that run past the stuck threshold

use crate::collector::TraceCollector;
use crate::timer::{TaskHandle, Timer};
use parking_lot::Mutex;
use std::sync::Arc;
use tierscope_core::{ConfigService, Ticker};
use tierscope_storage::TraceRegistry;
use tracing::debug;

/// Scans the active tier and persists partial snapshots of stuck traces
///
/// A trace is reported once: [`Trace::mark_stuck`](tierscope_core::Trace::mark_stuck)
/// only succeeds for the first scan that sees it over the threshold.
#[derive(Debug)]
pub struct StuckTraceCollector {
    registry: Arc<TraceRegistry>,
    collector: Arc<TraceCollector>,
    config: Arc<ConfigService>,
    ticker: Arc<dyn Ticker>,
    task: Mutex<Option<TaskHandle>>,
}

impl StuckTraceCollector {
    /// Create an idle collector; see [`start`](Self::start)
    pub fn new(
        registry: Arc<TraceRegistry>,
        collector: Arc<TraceCollector>,
        config: Arc<ConfigService>,
        ticker: Arc<dyn Ticker>,
    ) -> Self {
        Self {
            registry,
            collector,
            config,
            ticker,
            task: Mutex::new(None),
        }
    }

    /// Schedule the periodic scan on `timer`
    ///
    /// The scan period is re-read from configuration after every run.
    pub fn start(self: &Arc<Self>, timer: &Timer) {
        let weak = Arc::downgrade(self);
        let interval = self.config.get().stuck_check_interval();
        let handle = timer.schedule(interval, move || {
            let this = weak.upgrade()?;
            this.check();
            Some(this.config.get().stuck_check_interval())
        });
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Run one scan; returns the number of traces newly marked stuck
    pub fn check(&self) -> usize {
        let config = self.config.get();
        if !config.enabled {
            return 0;
        }
        let threshold = config.stuck_threshold_nanos();
        let tick = self.ticker.read();
        let mut marked = 0;
        for trace in self.registry.snapshot() {
            if trace.is_completed() || trace.duration_as_of(tick) < threshold {
                continue;
            }
            if trace.mark_stuck() {
                self.collector.on_stuck(&trace);
                marked += 1;
            }
        }
        if marked > 0 {
            debug!(marked, "stuck scan");
        }
        marked
    }

    /// Cancel the periodic scan
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }
}
