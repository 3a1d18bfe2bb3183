//! Unit tests for the plugin wire protocol.

use super::*;

#[test]
fn request_serialises_to_one_line() {
    let request = WireRequest::new(5, "codecheck", serde_json::json!({"path": "/ws/a.cs"}));
    let line = request.to_line().expect("serialise");

    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
    assert!(line.contains(r#""seq":5"#));
    assert!(line.contains(r#""command":"codecheck""#));
}

#[test]
fn response_round_trips() {
    let response = WireResponse::success(5, r#"{"fixes":[]}"#);
    let line = serde_json::to_string(&response).expect("serialise");
    let back = WireResponse::from_line(&line).expect("deserialise");

    assert_eq!(back, response);
    assert_eq!(back.request_seq(), 5);
    assert!(back.is_success());
    assert_eq!(back.body_json(), r#"{"fixes":[]}"#);
}

#[test]
fn failure_response_carries_a_message() {
    let response = WireResponse::failure(9, "no such document");
    assert!(!response.is_success());
    assert_eq!(response.message(), Some("no such document"));
    assert!(response.body_json().is_empty());
}

#[test]
fn response_parses_without_optional_fields() {
    let back = WireResponse::from_line(r#"{"request_seq":3,"success":true}"#)
        .expect("minimal response parses");
    assert_eq!(back.request_seq(), 3);
    assert!(back.message().is_none());
    assert!(back.body_json().is_empty());
}

#[test]
fn malformed_line_is_rejected() {
    let error = WireResponse::from_line("not json").expect_err("invalid line");
    assert!(matches!(
        error,
        crate::error::PluginError::DeserializeResponse { .. }
    ));
}

#[test]
fn trailing_whitespace_is_tolerated() {
    let back = WireResponse::from_line("{\"request_seq\":1,\"success\":true}\n")
        .expect("trailing newline parses");
    assert_eq!(back.request_seq(), 1);
}
