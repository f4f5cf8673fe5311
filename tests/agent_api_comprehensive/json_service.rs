//! JSON Points Service Tests
//!
//! Request parsing, status reporting and response shape.

use crate::*;
use serde_json::Value;

fn respond(t: &TestAgent, body: &str) -> Value {
    let response = t.agent.handle_points_request(body);
    serde_json::from_str(&response.to_json().unwrap()).unwrap()
}

#[test]
fn test_ok_response_shape() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let active = servlet.begin_trace("GET /active", false).unwrap();
    t.store_completed("done", NOW - 5_000, 250 * MILLI);
    t.ticker.set(2 * SECOND);

    let json = respond(&t, r#"{"from": -60000, "to": 0, "limit": 10}"#);
    assert_eq!(json["status"], "ok");
    assert_eq!(
        json["activePoints"],
        serde_json::json!([[NOW, 2.0, active.id().as_str()]])
    );
    assert_eq!(json["storedPoints"], serde_json::json!([[NOW - 5_000, 0.25, "done"]]));
    assert!(json.get("limitExceeded").is_none());
    assert!(json.get("message").is_none());
}

#[test]
fn test_limit_exceeded_reported() {
    let t = create_test_agent();
    for i in 0..3 {
        t.store_completed(&format!("s{}", i), NOW - 10, i as u64 + 1);
    }
    let json = respond(&t, r#"{"limit": 2}"#);
    assert_eq!(json["limitExceeded"], true);
    assert_eq!(json["storedPoints"].as_array().unwrap().len(), 2);
}

#[test]
fn test_malformed_request_yields_empty_ok() {
    let t = create_test_agent();
    t.store_completed("done", NOW - 10, 5);
    t.agent.plugin_services("servlet").begin_trace("GET /", false).unwrap();

    for body in [
        "",
        "{",
        r#"{"from": 0}"#,
        r#"{"limit": "ten"}"#,
        r#"{"from": 100, "to": 50, "limit": 10}"#,
        r#"{"low": 10, "high": 5, "limit": 10}"#,
    ] {
        let json = respond(&t, body);
        assert_eq!(json["status"], "ok", "body {:?}", body);
        assert_eq!(json["activePoints"], serde_json::json!([]));
        assert_eq!(json["storedPoints"], serde_json::json!([]));
        assert!(json.get("limitExceeded").is_none());
    }
}

#[test]
fn test_storage_failure_yields_error_status() {
    let t = create_test_agent();
    t.agent.plugin_services("servlet").begin_trace("GET /", false).unwrap();
    t.store.set_fail_reads(true);

    let json = respond(&t, r#"{"limit": 10}"#);
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("storage"));
    assert_eq!(json["activePoints"], serde_json::json!([]));
}

#[test]
fn test_user_id_comparator_names() {
    let t = create_test_agent();
    let servlet = t.agent.plugin_services("servlet");
    let trace = servlet.begin_trace("GET /", false).unwrap();
    servlet.set_user_id(&trace, "alice@example.com");
    t.ticker.set(MILLI);

    for comparator in ["begins", "contains", "equals", "EQUALS"] {
        let wanted = match comparator {
            "begins" => "alice",
            "contains" => "example",
            _ => "alice@example.com",
        };
        let body = format!(
            r#"{{"userIdComparator": "{}", "userId": "{}", "limit": 10}}"#,
            comparator, wanted
        );
        let json = respond(&t, &body);
        assert_eq!(json["activePoints"].as_array().unwrap().len(), 1, "{}", comparator);
    }

    let json = respond(
        &t,
        r#"{"userIdComparator": "sounds-like", "userId": "alice", "limit": 10}"#,
    );
    assert_eq!(json["status"], "ok");
    assert_eq!(json["activePoints"], serde_json::json!([]));
}
