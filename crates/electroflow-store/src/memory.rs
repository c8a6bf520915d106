use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ResultStore, StoreError};

/// In-memory result store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryResultStore {
  results: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryResultStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.results.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.results.read().await.is_empty()
  }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
  async fn store(&self, experiment_id: &str, result: &serde_json::Value) -> Result<(), StoreError> {
    self
      .results
      .write()
      .await
      .insert(experiment_id.to_string(), result.clone());
    Ok(())
  }

  async fn load(&self, experiment_id: &str) -> Result<serde_json::Value, StoreError> {
    self
      .results
      .read()
      .await
      .get(experiment_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(experiment_id.to_string()))
  }
}
