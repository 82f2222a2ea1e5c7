//! Persistence round-trip and edge case tests.
//!
//! Tests file I/O operations, JSON persistence, and cross-backend cookie
//! behaviour.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use portway_core::{Cookie, CookieStore};
use tempfile::TempDir;

use crate::persistence::{load_json, load_json_or_default, save_json};
use crate::{DbCookieStore, DurableCookieStore, JsonFileKv, MemoryCookieStore, MemoryKv};

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_and_load_json_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("network.json");

    let mut data = BTreeMap::new();
    data.insert("base_url".to_string(), "https://api.example.com/".to_string());

    save_json(&file_path, &data).await.unwrap();
    let loaded: BTreeMap<String, String> = load_json(&file_path).await.unwrap();

    assert_eq!(loaded, data);
}

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("test.json");

    let data = serde_json::json!({"key": "value"});

    let result = save_json(&nested_path, &data).await;
    assert!(result.is_ok());
    assert!(nested_path.exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/network.json");

    let result: Result<serde_json::Value, _> = load_json(&file_path).await;
    assert!(result.is_err());

    let fallback: BTreeMap<String, String> = load_json_or_default(&file_path).await;
    assert!(fallback.is_empty());
}

#[tokio::test]
async fn test_load_corrupt_file_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("network.json");
    tokio::fs::write(&file_path, "{ not json").await.unwrap();

    let fallback: BTreeMap<String, String> = load_json_or_default(&file_path).await;
    assert!(fallback.is_empty());
}

// ============================================================================
// Backend Contract Tests
// ============================================================================

fn backends(dir: &TempDir) -> Vec<Box<dyn CookieStore>> {
    vec![
        Box::new(MemoryCookieStore::new()),
        Box::new(DurableCookieStore::open(Arc::new(MemoryKv::new()))),
        Box::new(DurableCookieStore::open(Arc::new(
            JsonFileKv::open(dir.path().join("cookies.json")).unwrap(),
        ))),
        Box::new(DbCookieStore::open(&dir.path().join("cookies.db")).unwrap()),
    ]
}

#[test]
fn test_every_backend_hides_expired_cookies() {
    let dir = TempDir::new().unwrap();
    for store in backends(&dir) {
        store.add(
            "example.com",
            vec![
                Cookie::new("gone", "1", "example.com").with_expires_at(1),
                Cookie::new("live", "2", "example.com"),
            ],
        );
        let names: Vec<_> = store
            .get("example.com")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["live"], "backend {}", store.name());
    }
}

#[test]
fn test_every_backend_replaces_by_identity() {
    let dir = TempDir::new().unwrap();
    for store in backends(&dir) {
        store.add("example.com", vec![Cookie::new("a", "1", "example.com")]);
        store.add("example.com", vec![Cookie::new("a", "2", "example.com")]);
        let cookies = store.get("example.com");
        assert_eq!(cookies.len(), 1, "backend {}", store.name());
        assert_eq!(cookies[0].value, "2");
        assert!(store.remove_all());
        assert!(store.get_all().is_empty());
    }
}
