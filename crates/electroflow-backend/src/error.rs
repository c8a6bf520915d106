use std::time::Duration;

use thiserror::Error;

/// Errors raised by a measurement backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
  /// The instrument could not be reached.
  #[error("connection failed: {0}")]
  Connection(String),

  /// The measurement started but did not complete.
  #[error("measurement failed: {0}")]
  Execution(String),

  /// The measurement did not finish in time.
  #[error("measurement timed out after {0:?}")]
  Timeout(Duration),

  /// The instrument is in a state retrying cannot fix.
  #[error("fatal instrument error: {0}")]
  Fatal(String),
}

impl BackendError {
  pub fn is_retryable(&self) -> bool {
    !matches!(self, BackendError::Fatal(_))
  }
}

/// Every parameter problem found for one experiment.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid {uo_type} parameters: {}", errors.join("; "))]
pub struct ValidationError {
  pub uo_type: String,
  pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("unknown experiment type: {0}")]
  UnknownType(String),

  #[error("no backend registered for {0}")]
  NotRegistered(String),

  #[error("failed to connect {uo_type} backend: {source}")]
  Connect {
    uo_type: String,
    #[source]
    source: BackendError,
  },
}
