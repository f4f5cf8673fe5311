//! Trace Lifecycle Tests
//!
//! Instrumentation through plugin services and the completion pipeline.

use crate::*;
use tierscope::QueryFilter;

// =============================================================================
// INSTRUMENTATION
// =============================================================================

#[test]
fn test_full_trace_is_persisted() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /orders", false).unwrap();

    t.ticker.set(2 * MILLI);
    let query = servlet.start_entry(&trace, "SELECT * FROM orders");
    let execute = servlet.metric_name("jdbc execute");
    let timer = servlet.start_timer(&trace, &execute);
    t.ticker.set(7 * MILLI);
    assert_eq!(timer.stop(), 5 * MILLI);
    servlet.end_entry(&trace, query);
    servlet.set_user_id(&trace, "alice");

    t.ticker.set(10 * MILLI);
    assert!(servlet.complete_trace(&trace));
    t.agent.flush();

    let stored = t.store.read(trace.id()).unwrap().unwrap();
    assert!(stored.completed);
    assert_eq!(stored.headline, "GET /orders");
    assert_eq!(stored.start_time, NOW);
    assert_eq!(stored.duration, 10 * MILLI);
    assert_eq!(stored.user_id.as_deref(), Some("alice"));
    assert_eq!(stored.entries.len(), 2);
    assert_eq!(stored.entries[1].depth, 1);
    assert_eq!(stored.metrics.len(), 1);
    assert_eq!(stored.metrics[0].total_nanos, 5 * MILLI);
}

#[test]
fn test_metric_names_shared_across_plugin_services() {
    let t = create_test_agent();
    let first = t.agent.plugin_services("jdbc");
    let second = t.agent.plugin_services("jdbc");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first
        .metric_name("execute")
        .same_as(&second.metric_name("execute")));
    assert_ne!(
        first.metric_name("execute"),
        t.agent.plugin_services("http").metric_name("execute")
    );
}

#[test]
fn test_open_entries_closed_on_completion() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /leak", false).unwrap();
    servlet.start_entry(&trace, "never ended");
    t.ticker.set(3 * MILLI);
    servlet.complete_trace(&trace);

    assert!(trace.entries().iter().all(|e| e.end_tick == Some(3 * MILLI)));
}

// =============================================================================
// STORE THRESHOLD
// =============================================================================

#[test]
fn test_fast_trace_discarded() {
    let t = create_agent(AgentConfig {
        store_threshold_millis: 100,
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /fast", false).unwrap();
    t.ticker.set(10 * MILLI);
    assert!(!servlet.complete_trace(&trace));
    t.agent.flush();

    assert!(t.store.is_empty());
    let metrics = t.agent.metrics();
    assert_eq!(metrics.active_traces, 0);
    assert_eq!(metrics.pending_traces, 0);
    assert_eq!(metrics.traces_discarded, 1);
    assert!(t.agent.query_points(&QueryFilter::new(10)).unwrap().is_empty());
}

#[test]
fn test_fast_errored_trace_kept() {
    let t = create_agent(AgentConfig {
        store_threshold_millis: 100,
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /broken", false).unwrap();
    servlet.set_error(&trace, Some("connection reset".into()));
    t.ticker.set(MILLI);
    assert!(servlet.complete_trace(&trace));
    t.agent.flush();

    let stored = t.store.read(trace.id()).unwrap().unwrap();
    assert!(stored.error);
    assert_eq!(stored.error_message.as_deref(), Some("connection reset"));
    assert_eq!(t.agent.metrics().traces_stored, 1);
}

#[test]
fn test_short_active_trace_hidden_until_threshold() {
    let t = create_agent(AgentConfig {
        store_threshold_millis: 100,
        ..test_config()
    });
    let servlet = t.agent.plugin_services("servlet");
    servlet.begin_trace("GET /young", false).unwrap();

    t.ticker.set(50 * MILLI);
    assert!(t.agent.query_points(&QueryFilter::new(10)).unwrap().is_empty());
    t.ticker.set(150 * MILLI);
    assert_eq!(t.agent.query_points(&QueryFilter::new(10)).unwrap().active_points.len(), 1);
}

// =============================================================================
// COMPLETION EDGE CASES
// =============================================================================

#[test]
fn test_double_completion_is_noop() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /twice", false).unwrap();
    t.ticker.set(5 * MILLI);
    assert!(servlet.complete_trace(&trace));
    t.ticker.set(9 * MILLI);
    assert!(!servlet.complete_trace(&trace));
    t.agent.flush();

    assert_eq!(trace.duration(), Some(5 * MILLI));
    assert_eq!(t.store.len(), 1);
    assert_eq!(t.agent.metrics().traces_stored, 1);
}

#[test]
fn test_failed_write_keeps_trace_queryable() {
    let t = create_test_agent();
    t.store.set_fail_writes(true);
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /", false).unwrap();
    t.ticker.set(MILLI);
    servlet.complete_trace(&trace);
    t.agent.flush();

    assert_eq!(t.agent.metrics().pending_traces, 1);
    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(TestAgent::point_ids(&points).1, vec![trace.id().to_string()]);
}

#[test]
fn test_close_is_idempotent_and_keeps_queries_working() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /", false).unwrap();
    t.ticker.set(MILLI);
    servlet.complete_trace(&trace);

    t.agent.close();
    t.agent.close();
    assert!(t.agent.module().is_closed());
    assert_eq!(t.store.len(), 1);

    let points = t.agent.query_points(&QueryFilter::new(10)).unwrap();
    assert_eq!(points.stored_points.len(), 1);
}
