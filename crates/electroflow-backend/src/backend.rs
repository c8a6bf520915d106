use async_trait::async_trait;
use electroflow_config::Params;

use crate::error::BackendError;
use crate::experiment_type::ExperimentType;

/// Measurement driver for one technique.
///
/// The registry owns each backend behind a lock, so methods take `&mut self`
/// and never run concurrently on the same instance.
#[async_trait]
pub trait Backend: Send + Sync {
  fn experiment_type(&self) -> ExperimentType;

  async fn connect(&mut self) -> Result<(), BackendError>;

  /// Technique-specific checks beyond the declared limits.
  ///
  /// Receives the normalised snapshot. Must not touch the instrument.
  fn validate_parameters(&self, _params: &Params) -> Vec<String> {
    Vec::new()
  }

  async fn execute_measurement(&mut self, params: &Params) -> Result<serde_json::Value, BackendError>;

  async fn disconnect(&mut self) -> Result<(), BackendError>;
}
