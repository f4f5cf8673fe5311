//! Background Scheduler Tests
//!
//! Stuck detection and profiling, driven directly and through the timer.

use crate::*;
use std::thread;
use std::time::{Duration, Instant};
use tierscope::{FineProfilingConfig, QueryFilter};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// =============================================================================
// STUCK TRACES
// =============================================================================

#[test]
fn test_stuck_scan_marks_only_old_traces() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let old = servlet.begin_trace("GET /old", false).unwrap();
    t.ticker.set(30 * SECOND);
    let young = servlet.begin_trace("GET /young", false).unwrap();
    t.ticker.set(65 * SECOND);

    let stuck = t.agent.module().stuck_collector();
    assert_eq!(stuck.check(), 1);
    assert_eq!(stuck.check(), 0);
    assert!(old.is_stuck());
    assert!(!young.is_stuck());
}

#[test]
fn test_stuck_scan_runs_on_timer() {
    let t = create_agent(AgentConfig {
        stuck_threshold_seconds: 1,
        stuck_check_interval_millis: 5,
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /hang", false).unwrap();
    t.ticker.set(2 * SECOND);

    assert!(wait_for(|| trace.is_stuck()));
    t.agent.flush();
    let partial = t.store.read(trace.id()).unwrap().unwrap();
    assert!(!partial.completed);
    assert!(partial.stuck);
}

#[test]
fn test_stuck_trace_forced_into_store() {
    let t = create_agent(AgentConfig {
        store_threshold_millis: 3_600_000,
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /hang", false).unwrap();
    t.ticker.set(61 * SECOND);
    t.agent.module().stuck_collector().check();
    servlet.complete_trace(&trace);
    t.agent.flush();

    assert!(t.store.read(trace.id()).unwrap().unwrap().completed);
}

// =============================================================================
// COARSE PROFILING
// =============================================================================

#[test]
fn test_coarse_samples_follow_open_entries() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /report", false).unwrap();
    servlet.start_entry(&trace, "render pdf");

    let coarse = t.agent.module().coarse_profiler();
    t.ticker.set(50 * MILLI);
    assert_eq!(coarse.sample_all(), 0);
    t.ticker.set(200 * MILLI);
    assert_eq!(coarse.sample_all(), 1);
    t.ticker.set(31 * SECOND);
    assert_eq!(coarse.sample_all(), 0);

    t.ticker.set(32 * SECOND);
    servlet.complete_trace(&trace);
    t.agent.flush();
    let stored = t.store.read(trace.id()).unwrap().unwrap();
    assert_eq!(stored.coarse_samples.len(), 1);
    assert_eq!(
        stored.coarse_samples[0].frames,
        vec!["GET /report".to_string(), "render pdf".to_string()]
    );
}

// =============================================================================
// FINE PROFILING
// =============================================================================

#[test]
fn test_fine_profiling_selects_and_samples() {
    let t = create_agent(AgentConfig {
        store_threshold_millis: 3_600_000,
        fine: FineProfilingConfig {
            store_percentage: 100.0,
            interval_millis: 1,
            total_seconds: 10,
        },
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /sampled", false).unwrap();
    assert!(trace.is_fine());
    assert!(wait_for(|| trace.fine_samples().len() >= 2));

    // fine traces are kept even below the store threshold
    t.ticker.set(MILLI);
    assert!(servlet.complete_trace(&trace));
    t.agent.flush();
    assert!(t.store.read(trace.id()).unwrap().unwrap().fine);

    let points = t.agent.query_points(&QueryFilter::new(10).fine_only()).unwrap();
    assert_eq!(TestAgent::point_ids(&points).1, vec![trace.id().to_string()]);
}

#[test]
fn test_fine_profiling_off_by_default() {
    let t = create_test_agent();
    let trace = t
        .agent
        .plugin_services("servlet")
        .begin_trace("GET /", false)
        .unwrap();
    assert!(!trace.is_fine());
    assert_eq!(t.agent.module().fine_scheduler().active_tasks(), 0);
}

#[test]
fn test_close_stops_fine_sampling() {
    let t = create_agent(AgentConfig {
        fine: FineProfilingConfig {
            store_percentage: 100.0,
            interval_millis: 1,
            total_seconds: 10,
        },
        ..test_config()
    });
    let trace = t
        .agent
        .plugin_services("servlet")
        .begin_trace("GET /", false)
        .unwrap();
    assert!(wait_for(|| !trace.fine_samples().is_empty()));

    t.agent.close();
    let after_close = trace.fine_samples().len();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(trace.fine_samples().len(), after_close);
}
