//! Low-frequency profiling of every active trace

use crate::sampler::StackSampler;
use crate::timer::{TaskHandle, Timer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tierscope_core::clock::NANOS_PER_MILLI;
use tierscope_core::{ConfigService, ProfileSample, Ticker};
use tierscope_storage::TraceRegistry;
use tracing::trace;

/// Samples active traces that have run past the initial delay
///
/// Sampling stops for a trace once it has run longer than the configured
/// total, bounding the profile size of long-running work.
#[derive(Debug)]
pub struct CoarseProfiler {
    registry: Arc<TraceRegistry>,
    config: Arc<ConfigService>,
    ticker: Arc<dyn Ticker>,
    sampler: Arc<dyn StackSampler>,
    task: Mutex<Option<TaskHandle>>,
}

impl CoarseProfiler {
    /// Create an idle profiler; see [`start`](Self::start)
    pub fn new(
        registry: Arc<TraceRegistry>,
        config: Arc<ConfigService>,
        ticker: Arc<dyn Ticker>,
        sampler: Arc<dyn StackSampler>,
    ) -> Self {
        Self {
            registry,
            config,
            ticker,
            sampler,
            task: Mutex::new(None),
        }
    }

    /// Schedule the sampling pass on `timer`
    pub fn start(self: &Arc<Self>, timer: &Timer) {
        let weak = Arc::downgrade(self);
        let interval = Duration::from_millis(self.config.get().coarse.interval_millis);
        let handle = timer.schedule(interval, move || {
            let this = weak.upgrade()?;
            this.sample_all();
            Some(Duration::from_millis(this.config.get().coarse.interval_millis))
        });
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Take one sample of every eligible trace; returns how many were sampled
    pub fn sample_all(&self) -> usize {
        let config = self.config.get();
        if !config.enabled {
            return 0;
        }
        let initial = config.coarse.initial_delay_millis.saturating_mul(NANOS_PER_MILLI);
        let total = config.coarse.total_seconds.saturating_mul(1_000_000_000);
        let tick = self.ticker.read();

        let mut sampled = 0;
        for active in self.registry.snapshot() {
            if active.is_completed() {
                continue;
            }
            let elapsed = active.duration_as_of(tick);
            if elapsed < initial || elapsed > total {
                continue;
            }
            active.add_coarse_sample(ProfileSample {
                tick,
                frames: self.sampler.sample(&active),
            });
            sampled += 1;
        }
        trace!(sampled, "coarse profiling pass");
        sampled
    }

    /// Cancel sampling
    pub fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }
}
