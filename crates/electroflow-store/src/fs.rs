use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::{ResultStore, StoreError};

/// Filesystem-based result store.
///
/// Each result is stored at `{base_path}/{experiment_id}/results.json`.
/// Parent directories are created automatically.
pub struct FsResultStore {
  base_path: PathBuf,
}

impl FsResultStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  fn result_path(&self, experiment_id: &str) -> PathBuf {
    self.base_path.join(experiment_id).join("results.json")
  }
}

#[async_trait]
impl ResultStore for FsResultStore {
  async fn store(&self, experiment_id: &str, result: &serde_json::Value) -> Result<(), StoreError> {
    let path = self.result_path(experiment_id);

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec_pretty(result)?;
    let mut file = File::create(path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
  }

  async fn load(&self, experiment_id: &str) -> Result<serde_json::Value, StoreError> {
    let path = self.result_path(experiment_id);
    let bytes = fs::read(&path).await.map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(experiment_id.to_string())
      } else {
        StoreError::Io(e)
      }
    })?;
    Ok(serde_json::from_slice(&bytes)?)
  }
}
