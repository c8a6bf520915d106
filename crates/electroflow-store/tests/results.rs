//! Result store integration tests.

use electroflow_store::{FsResultStore, MemoryResultStore, ResultStore, StoreError};
use serde_json::json;

#[tokio::test]
async fn test_fs_store_roundtrip_layout() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let store = FsResultStore::new(temp_dir.path());
  let result = json!({ "technique": "OCV", "summary": { "final_voltage": 0.91 } });

  store.store("exp-1", &result).await.unwrap();

  let path = temp_dir.path().join("exp-1").join("results.json");
  assert!(path.exists());
  assert_eq!(store.load("exp-1").await.unwrap(), result);
}

#[tokio::test]
async fn test_fs_store_overwrites() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let store = FsResultStore::new(temp_dir.path());

  store.store("exp-1", &json!({ "v": 1 })).await.unwrap();
  store.store("exp-1", &json!({ "v": 2 })).await.unwrap();

  assert_eq!(store.load("exp-1").await.unwrap()["v"], json!(2));
}

#[tokio::test]
async fn test_missing_result() {
  let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
  let fs_store = FsResultStore::new(temp_dir.path());
  let memory = MemoryResultStore::new();

  assert!(matches!(fs_store.load("ghost").await, Err(StoreError::NotFound(_))));
  assert!(matches!(memory.load("ghost").await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_memory_store() {
  let store = MemoryResultStore::new();
  assert!(store.is_empty().await);

  store.store("a", &json!([1, 2, 3])).await.unwrap();
  assert_eq!(store.len().await, 1);
  assert_eq!(store.load("a").await.unwrap(), json!([1, 2, 3]));
}
