//! Configuration Tests
//!
//! Live updates and file reloads reach the running agent.

use crate::*;
use std::io::Write;
use tierscope::QueryFilter;

#[test]
fn test_update_changes_store_threshold() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");

    t.agent
        .update_config(AgentConfig {
            store_threshold_millis: 100,
            ..test_config()
        })
        .unwrap();
    let fast = servlet.begin_trace("GET /fast", false).unwrap();
    t.ticker.set(10 * MILLI);
    assert!(!servlet.complete_trace(&fast));

    t.agent.update_config(test_config()).unwrap();
    let kept = servlet.begin_trace("GET /kept", false).unwrap();
    assert!(servlet.complete_trace(&kept));
}

#[test]
fn test_invalid_update_keeps_current() {
    let t = create_test_agent();
    let err = t
        .agent
        .update_config(AgentConfig {
            fine: tierscope::FineProfilingConfig {
                store_percentage: 150.0,
                ..Default::default()
            },
            ..test_config()
        })
        .unwrap_err();
    assert!(matches!(err, tierscope::Error::Config(_)));
    assert_eq!(*t.agent.config(), test_config());
}

#[test]
fn test_reload_from_file() {
    let t = create_test_agent();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "enabled = false\nstore_threshold_millis = 42").unwrap();

    t.agent.reload_config(file.path()).unwrap();
    assert!(!t.agent.config().enabled);
    assert_eq!(t.agent.config().store_threshold_millis, 42);
    assert!(!t.agent.plugin_services("servlet").is_enabled());
}

#[test]
fn test_reload_bad_file_keeps_current() {
    let t = create_test_agent();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "store_threshold_millis = \"soon\"").unwrap();

    assert!(t.agent.reload_config(file.path()).is_err());
    assert!(t.agent.reload_config("/nonexistent/agent.toml").is_err());
    assert_eq!(*t.agent.config(), test_config());
    assert!(t.agent.query_points(&QueryFilter::new(1)).is_ok());
}
