//! High-frequency profiling of a random share of traces

use crate::sampler::StackSampler;
use crate::timer::{TaskHandle, Timer};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tierscope_core::{ConfigService, ProfileSample, Ticker, Trace};
use tracing::debug;

/// Selects traces for fine profiling when they begin
///
/// A selected trace is marked fine, which forces it to be stored, and gets
/// its own timer task that samples it until it completes or has run for the
/// configured total.
#[derive(Debug)]
pub struct FineProfileScheduler {
    timer: Arc<Timer>,
    config: Arc<ConfigService>,
    ticker: Arc<dyn Ticker>,
    sampler: Arc<dyn StackSampler>,
    rng: Mutex<StdRng>,
    tasks: Mutex<Vec<TaskHandle>>,
    closed: AtomicBool,
}

impl FineProfileScheduler {
    /// Create a scheduler with an entropy-seeded selector
    pub fn new(
        timer: Arc<Timer>,
        config: Arc<ConfigService>,
        ticker: Arc<dyn Ticker>,
        sampler: Arc<dyn StackSampler>,
    ) -> Self {
        Self::with_rng(timer, config, ticker, sampler, StdRng::from_entropy())
    }

    /// Create a scheduler with a caller-provided selector
    pub fn with_rng(
        timer: Arc<Timer>,
        config: Arc<ConfigService>,
        ticker: Arc<dyn Ticker>,
        sampler: Arc<dyn StackSampler>,
        rng: StdRng,
    ) -> Self {
        Self {
            timer,
            config,
            ticker,
            sampler,
            rng: Mutex::new(rng),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Roll for `trace` and arm its sampling task when selected
    ///
    /// Returns whether the trace was selected.
    pub fn maybe_schedule(&self, trace: &Arc<Trace>) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let config = self.config.get();
        let percentage = config.fine.store_percentage;
        if !config.enabled || percentage <= 0.0 {
            return false;
        }
        let roll: f64 = self.rng.lock().gen_range(0.0..100.0);
        if roll >= percentage {
            return false;
        }

        // close() drains under this lock, so a task armed here is either
        // drained by it or never armed
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        trace.mark_fine();
        let target = Arc::downgrade(trace);
        let config = Arc::clone(&self.config);
        let ticker = Arc::clone(&self.ticker);
        let sampler = Arc::clone(&self.sampler);
        let interval = Duration::from_millis(self.config.get().fine.interval_millis);
        let handle = self.timer.schedule(interval, move || {
            let trace = target.upgrade()?;
            if trace.is_completed() {
                return None;
            }
            let fine = config.get().fine.clone();
            let tick = ticker.read();
            if trace.duration_as_of(tick) > fine.total_seconds.saturating_mul(1_000_000_000) {
                return None;
            }
            trace.add_fine_sample(ProfileSample {
                tick,
                frames: sampler.sample(&trace),
            });
            Some(Duration::from_millis(fine.interval_millis))
        });
        debug!(trace_id = %trace.id(), "trace selected for fine profiling");

        tasks.retain(|task| !task.is_done());
        tasks.push(handle);
        true
    }

    /// Number of sampling tasks still armed
    pub fn active_tasks(&self) -> usize {
        self.tasks.lock().iter().filter(|task| !task.is_done()).count()
    }

    /// Cancel every sampling task and stop selecting traces
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.cancel();
        }
    }
}
