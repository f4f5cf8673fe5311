//! Points Query Tests
//!
//! Cross-tier merge, deduplication, limit and window behavior.

use crate::*;
use tierscope::{QueryFilter, UserIdComparator};

// =============================================================================
// TIER SCENARIOS
// =============================================================================

#[test]
fn test_single_active_trace() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    t.ticker.set(100);
    let trace = servlet.begin_trace("GET /a", false).unwrap();
    t.ticker.set(100 + 1_500 * MILLI);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(points.active_points.len(), 1);
    assert_eq!(points.active_points[0].id(), trace.id());
    assert_eq!(points.active_points[0].captured_at(), NOW);
    assert!((points.active_points[0].elapsed_seconds() - 1.5).abs() < 1e-9);
    assert!(points.stored_points.is_empty());
    assert!(!points.limit_exceeded);
}

#[test]
fn test_pending_merged_between_stored() {
    let t = create_test_agent();
    t.store_completed("B", NOW - 100, 50);
    t.store_completed("C", NOW - 100, 200);
    // failed writes keep the trace in the pending tier
    t.store.set_fail_writes(true);
    let servlet = t.agent.plugin_services("servlet");
    let pending = servlet.begin_trace("GET /d", false).unwrap();
    t.ticker.set(100);
    servlet.complete_trace(&pending);
    t.agent.flush();
    assert_eq!(t.agent.metrics().pending_traces, 1);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    let (active, stored) = TestAgent::point_ids(&points);
    assert!(active.is_empty());
    assert_eq!(stored, vec!["B".to_string(), pending.id().to_string(), "C".to_string()]);
}

#[test]
fn test_pending_trace_stored_once_store_recovers() {
    let t = create_test_agent();
    t.store.set_fail_writes(true);
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /retry", false).unwrap();
    t.ticker.set(100);
    servlet.complete_trace(&trace);
    t.agent.flush();
    assert_eq!(t.agent.metrics().pending_traces, 1);

    t.store.set_fail_writes(false);
    t.agent.flush();
    assert_eq!(t.agent.metrics().pending_traces, 0);
    assert!(t.store.read(trace.id()).unwrap().unwrap().completed);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(TestAgent::point_ids(&points).1, vec![trace.id().to_string()]);
}

#[test]
fn test_pending_duplicate_of_stored_discarded() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /b", false).unwrap();
    t.store_completed(trace.id().as_str(), NOW - 10, 50);
    // the writer's own snapshot keeps failing, so the trace stays pending
    t.store.set_fail_writes(true);
    t.ticker.set(50);
    servlet.complete_trace(&trace);
    t.agent.flush();
    assert_eq!(t.agent.metrics().pending_traces, 1);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(points.stored_points.len(), 1);
    assert_eq!(points.stored_points[0].id(), trace.id());
    assert_eq!(points.stored_points[0].captured_at(), NOW - 10);
}

#[test]
fn test_limit_keeps_active_and_truncates_summaries() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let first = servlet.begin_trace("GET /1", false).unwrap();
    t.ticker.set(1);
    let second = servlet.begin_trace("GET /2", false).unwrap();
    t.store_completed("s1", NOW - 30, 10);
    t.store_completed("s2", NOW - 20, 20);
    t.store_completed("s3", NOW - 10, 30);
    t.ticker.set(100);

    let points = t.agent.query_points(&QueryFilter::new(2)).unwrap();
    let (active, stored) = TestAgent::point_ids(&points);
    assert_eq!(active, vec![first.id().to_string(), second.id().to_string()]);
    assert!(stored.is_empty());
    assert!(points.limit_exceeded);
}

#[test]
fn test_limit_exactly_met_is_not_exceeded() {
    let t = create_test_agent();
    t.store_completed("s1", NOW - 30, 10);
    t.store_completed("s2", NOW - 20, 20);

    let points = t.agent.query_points(&QueryFilter::new(2)).unwrap();
    assert_eq!(points.stored_points.len(), 2);
    assert!(!points.limit_exceeded);
}

// =============================================================================
// TRANSITIONS
// =============================================================================

#[test]
fn test_completed_trace_moves_from_active_to_stored() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /move", false).unwrap();
    t.ticker.set(20 * MILLI);

    let before = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(TestAgent::point_ids(&before).0, vec![trace.id().to_string()]);

    servlet.complete_trace(&trace);
    let during = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert!(during.active_points.is_empty());
    assert_eq!(TestAgent::point_ids(&during).1, vec![trace.id().to_string()]);

    t.agent.flush();
    let after = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert!(after.active_points.is_empty());
    assert_eq!(TestAgent::point_ids(&after).1, vec![trace.id().to_string()]);
    assert!((after.stored_points[0].duration_seconds() - 0.02).abs() < 1e-9);
}

#[test]
fn test_stuck_trace_stays_active_until_complete() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("batch");
    let trace = servlet.begin_trace("nightly export", true).unwrap();
    t.ticker.set(61 * SECOND);
    assert_eq!(t.agent.module().stuck_collector().check(), 1);
    t.agent.flush();
    assert!(!t.store.read(trace.id()).unwrap().unwrap().completed);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(TestAgent::point_ids(&points), (vec![trace.id().to_string()], vec![]));

    t.ticker.set(70 * SECOND);
    servlet.complete_trace(&trace);
    t.agent.flush();
    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(TestAgent::point_ids(&points), (vec![], vec![trace.id().to_string()]));
    assert!((points.stored_points[0].duration_seconds() - 70.0).abs() < 1e-9);
}

// =============================================================================
// WINDOW AND CRITERIA
// =============================================================================

#[test]
fn test_window_in_the_past_excludes_live_tiers() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    servlet.begin_trace("GET /live", false).unwrap();
    t.store_completed("old", NOW - 50_000, 10);
    t.store_completed("older", NOW - 500_000, 10);

    let filter = QueryFilter::new(10).with_range(NOW - 100_000, NOW - 1_000);
    let points = t.agent.query_points(&filter).unwrap();
    assert_eq!(TestAgent::point_ids(&points), (vec![], vec!["old".to_string()]));
}

#[test]
fn test_relative_window() {
    let t = create_test_agent();
    t.store_completed("recent", NOW - 30_000, 10);
    t.store_completed("stale", NOW - 120_000, 10);

    let filter = QueryFilter::new(10).with_range(-60_000, 0);
    let points = t.agent.query_points(&filter).unwrap();
    assert_eq!(TestAgent::point_ids(&points).1, vec!["recent".to_string()]);
}

#[test]
fn test_criteria_apply_to_every_tier() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");

    let active_alice = servlet.begin_trace("GET /active", false).unwrap();
    servlet.set_user_id(&active_alice, "alice");
    let active_bob = servlet.begin_trace("GET /active", false).unwrap();
    servlet.set_user_id(&active_bob, "bob");

    let done_alicia = servlet.begin_trace("GET /done", false).unwrap();
    servlet.set_user_id(&done_alicia, "alicia");
    t.ticker.set(10 * MILLI);
    servlet.complete_trace(&done_alicia);
    t.agent.flush();

    let filter = QueryFilter::new(10).with_user_id(UserIdComparator::Begins, "ali");
    let points = t.agent.query_points(&filter).unwrap();
    assert_eq!(
        TestAgent::point_ids(&points),
        (vec![active_alice.id().to_string()], vec![done_alicia.id().to_string()])
    );
}

#[test]
fn test_duration_range() {
    let t = create_test_agent();
    t.store_completed("short", NOW - 10, 5 * MILLI);
    t.store_completed("medium", NOW - 10, 50 * MILLI);
    t.store_completed("long", NOW - 10, 500 * MILLI);

    let filter = QueryFilter::new(10).with_duration(10 * MILLI, 100 * MILLI);
    let points = t.agent.query_points(&filter).unwrap();
    assert_eq!(TestAgent::point_ids(&points).1, vec!["medium".to_string()]);
}

#[test]
fn test_background_filter() {
    let t = create_test_agent();
    let plugin = t.agent.plugin_services("jobs");
    let job = plugin.begin_trace("cleanup", true).unwrap();
    plugin.begin_trace("GET /", false).unwrap();
    t.ticker.set(MILLI);

    let filter = QueryFilter::new(10).with_background(Some(true));
    let points = t.agent.query_points(&filter).unwrap();
    assert_eq!(TestAgent::point_ids(&points).0, vec![job.id().to_string()]);
}

// =============================================================================
// FAILURES
// =============================================================================

#[test]
fn test_storage_read_failure_is_degraded() {
    let t = create_test_agent();
    t.store.set_fail_reads(true);
    let err = t.agent.query_points(&QueryFilter::new(10)).unwrap_err();
    assert!(err.is_degraded());
}

#[test]
fn test_unrecognized_comparator_matches_nothing() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /", false).unwrap();
    servlet.set_user_id(&trace, "alice");

    let filter = QueryFilter::new(10)
        .with_user_id(UserIdComparator::Unrecognized("regex".into()), "alice");
    assert!(t.agent.query_points(&filter).unwrap().is_empty());
}
