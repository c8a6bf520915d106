//! Electroflow Store
//!
//! This crate owns the experiment record and everything that keeps track of
//! it after dispatch:
//! - [`Experiment`] and its status state machine
//! - [`StatusTracker`], the in-memory registry of experiments with an
//!   explicit [`RetentionPolicy`]
//! - [`ResultStore`], where completed measurement results are persisted
//!
//! The [`ResultStore`] trait defines the backend layer for result storage.
//! Implementations handle the actual storage (filesystem, memory, ...).

mod experiment;
mod fs;
mod memory;
mod tracker;

pub use experiment::{Experiment, ExperimentStatus, StatusChange, TransitionError};
pub use fs::FsResultStore;
pub use memory::MemoryResultStore;
pub use tracker::{RetentionPolicy, StatusTracker, TrackerError};

use async_trait::async_trait;

/// Error type for result storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested result was not found.
  #[error("result not found: {0}")]
  NotFound(String),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The result could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Result storage trait.
///
/// Keys are experiment ids. Storing twice under the same id replaces the
/// earlier result.
#[async_trait]
pub trait ResultStore: Send + Sync {
  /// Persist the result of a completed experiment.
  async fn store(&self, experiment_id: &str, result: &serde_json::Value) -> Result<(), StoreError>;

  /// Load a previously stored result.
  async fn load(&self, experiment_id: &str) -> Result<serde_json::Value, StoreError>;
}
