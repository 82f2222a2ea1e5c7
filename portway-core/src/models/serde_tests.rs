//! Serde tests for core types.
//!
//! These tests pin the JSON shapes that cross process boundaries: the
//! server envelope and the persisted cookie attribute set.

use serde_json::json;

use crate::{ApiResponse, Cookie, ErrorKind};

// ============================================================================
// ApiResponse Serde Tests
// ============================================================================

#[test]
fn test_api_response_deserialize_full() {
    let json = r#"{"code":200,"msg":"ok","data":{"id":7}}"#;
    let response: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
    assert!(response.is_success());
    assert_eq!(response.msg, "ok");
    assert_eq!(response.data, Some(json!({"id": 7})));
}

#[test]
fn test_api_response_missing_msg_and_data() {
    let response: ApiResponse<String> = serde_json::from_str(r#"{"code":500}"#).unwrap();
    assert_eq!(response.code, 500);
    assert!(response.msg.is_empty());
    assert!(response.data.is_none());
}

#[test]
fn test_api_response_null_data() {
    let response: ApiResponse<Vec<u8>> =
        serde_json::from_str(r#"{"code":200,"msg":"","data":null}"#).unwrap();
    assert_eq!(response.into_result(), Ok(None));
}

#[test]
fn test_api_response_missing_code_fails() {
    let result: Result<ApiResponse<String>, _> = serde_json::from_str(r#"{"msg":"x"}"#);
    assert!(result.is_err());
}

// ============================================================================
// Cookie Serde Tests
// ============================================================================

#[test]
fn test_cookie_field_names() {
    let cookie = Cookie::new("sid", "abc", "example.com").with_expires_at(1_000);
    let value = serde_json::to_value(&cookie).unwrap();
    assert_eq!(value["name"], "sid");
    assert_eq!(value["domain"], "example.com");
    assert_eq!(value["path"], "/");
    assert_eq!(value["expires_at"], 1_000);
    assert_eq!(value["persistent"], true);
}

#[test]
fn test_cookie_optional_flags_default_to_false() {
    let json = r#"{
        "name": "sid",
        "value": "abc",
        "domain": "example.com",
        "path": "/",
        "expires_at": 5,
        "persistent": true
    }"#;
    let cookie: Cookie = serde_json::from_str(json).unwrap();
    assert!(!cookie.secure);
    assert!(!cookie.http_only);
    assert!(!cookie.host_only);
}

// ============================================================================
// ErrorKind Serde Tests
// ============================================================================

#[test]
fn test_error_kind_snake_case() {
    assert_eq!(
        serde_json::to_string(&ErrorKind::HttpStatus).unwrap(),
        r#""http_status""#
    );
    let kind: ErrorKind = serde_json::from_str(r#""tls""#).unwrap();
    assert_eq!(kind, ErrorKind::Tls);
}
