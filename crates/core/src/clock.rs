//! Time sources
//!
//! Two clocks are kept apart on purpose. [`Clock`] is wall-clock time in
//! milliseconds since the epoch and is only used for timestamps shown to
//! users. [`Ticker`] is a monotonic nanosecond counter and is the only input
//! to duration and ordering math, since wall-clock time can jump.
//!
//! [`ManualClock`] and [`ManualTicker`] are deterministic sources for tests
//! and for replaying captured timings.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Nanoseconds per second, used when rendering durations as seconds.
pub const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// Wall-clock time source
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch
    fn current_time_millis(&self) -> i64;
}

/// Monotonic high-resolution time source
pub trait Ticker: Send + Sync + fmt::Debug {
    /// Current reading in nanoseconds; never decreases
    fn read(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Monotonic ticker anchored at its creation instant
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTicker {
    origin: Instant,
}

impl MonotonicTicker {
    /// Create a ticker reading zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker for MonotonicTicker {
    fn read(&self) -> u64 {
        // u64 nanoseconds overflows after ~584 years of uptime
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Manually driven wall clock
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `millis`
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Set the current time
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn current_time_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Manually driven ticker
#[derive(Debug, Default)]
pub struct ManualTicker {
    nanos: AtomicU64,
}

impl ManualTicker {
    /// Create a ticker reading `nanos`
    pub fn new(nanos: u64) -> Self {
        Self {
            nanos: AtomicU64::new(nanos),
        }
    }

    /// Set the current reading
    ///
    /// Callers are responsible for keeping readings non-decreasing.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Move the ticker forward
    pub fn advance(&self, nanos: u64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Ticker for ManualTicker {
    fn read(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
