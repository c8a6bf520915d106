use electroflow_backend::{RegistryError, ValidationError};
use electroflow_store::TransitionError;
use thiserror::Error;

/// Reasons a dispatch is refused before any experiment record exists,
/// or a bookkeeping failure while one is running.
#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("unknown experiment type: {0}")]
  UnknownType(String),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("backend unavailable: {0}")]
  Registry(#[source] RegistryError),

  #[error(transparent)]
  Transition(#[from] TransitionError),
}

impl From<RegistryError> for DispatchError {
  fn from(err: RegistryError) -> Self {
    match err {
      RegistryError::UnknownType(tag) => DispatchError::UnknownType(tag),
      other => DispatchError::Registry(other),
    }
  }
}

/// Errors from the workflow runner's submission surface.
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("workflow runner channel closed")]
  ChannelClosed,

  #[error("workflow runner already started")]
  AlreadyStarted,
}
