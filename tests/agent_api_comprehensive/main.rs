//! Agent API Comprehensive Test Suite
//!
//! End-to-end tests through the [`Agent`] facade: instrumentation via plugin
//! services, the completion pipeline, background scans, and the points query
//! across the active, pending and stored tiers.
//!
//! Time is driven by [`ManualClock`] / [`ManualTicker`]; the background
//! scans are invoked directly instead of waiting on the timer.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all agent tests
//! cargo test --test agent_api_comprehensive
//!
//! # Run points query tests only
//! cargo test --test agent_api_comprehensive query_points::
//! ```

use std::sync::Arc;

use tierscope::{
    Agent, AgentConfig, CoarseProfilingConfig, DurableTraceStore, InMemoryTraceStore, ManualClock,
    ManualTicker, StoredTrace, Trace, TraceId,
};

pub mod config;
pub mod json_service;
pub mod lifecycle;
pub mod query_points;
pub mod schedulers;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Wall-clock time every test agent starts at, ms
pub const NOW: i64 = 1_700_000_000_000;

/// One millisecond in ticker nanoseconds
pub const MILLI: u64 = 1_000_000;

/// One second in ticker nanoseconds
pub const SECOND: u64 = 1_000_000_000;

/// Agent plus handles on its time sources and store
pub struct TestAgent {
    pub agent: Agent,
    pub clock: Arc<ManualClock>,
    pub ticker: Arc<ManualTicker>,
    pub store: Arc<InMemoryTraceStore>,
}

impl TestAgent {
    /// Write a completed row straight into the durable tier
    pub fn store_completed(&self, id: &str, captured_at: i64, duration: u64) {
        let trace = Trace::new(TraceId::from(id), "stored", false, captured_at, 0);
        trace.complete(duration);
        self.store
            .write(StoredTrace::capture(&trace, captured_at, duration))
            .unwrap();
    }

    /// Ids of all points, active first
    pub fn point_ids(points: &tierscope::TracePoints) -> (Vec<String>, Vec<String>) {
        (
            points.active_points.iter().map(|p| p.id().to_string()).collect(),
            points.stored_points.iter().map(|p| p.id().to_string()).collect(),
        )
    }
}

/// Install a fmt subscriber writing through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Configuration with no store threshold and scans that stay out of the way
pub fn test_config() -> AgentConfig {
    AgentConfig {
        store_threshold_millis: 0,
        stuck_threshold_seconds: 60,
        stuck_check_interval_millis: 3_600_000,
        coarse: CoarseProfilingConfig {
            initial_delay_millis: 100,
            interval_millis: 3_600_000,
            total_seconds: 30,
        },
        ..AgentConfig::default()
    }
}

/// Create an agent with manual time and an in-memory store
pub fn create_agent(config: AgentConfig) -> TestAgent {
    init_tracing();
    let clock = Arc::new(ManualClock::new(NOW));
    let ticker = Arc::new(ManualTicker::new(0));
    let store = Arc::new(InMemoryTraceStore::new());
    let agent = Agent::builder()
        .config(config)
        .clock(clock.clone())
        .ticker(ticker.clone())
        .store(store.clone())
        .fine_seed(17)
        .start()
        .expect("Failed to start test agent");
    TestAgent {
        agent,
        clock,
        ticker,
        store,
    }
}

/// Create an agent with [`test_config`]
pub fn create_test_agent() -> TestAgent {
    create_agent(test_config())
}
