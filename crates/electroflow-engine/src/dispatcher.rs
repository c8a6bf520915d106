//! Experiment dispatcher.
//!
//! Turns `(uo_type, params)` into a tracked [`Experiment`]: validates,
//! resolves the backend, runs the measurement under a timeout with retries,
//! and persists the result.

use std::sync::Arc;
use std::time::Duration;

use electroflow_backend::{BackendError, BackendRegistry, ExperimentType, ParameterValidator, ValidationError};
use electroflow_config::Params;
use electroflow_store::{Experiment, ResultStore, StatusTracker};
use tracing::{info, instrument, warn};

use crate::error::DispatchError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::retry::RetryPolicy;

/// One measurement to run.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
  pub uo_type: String,
  pub params: Params,
  pub node_id: Option<String>,
  /// Falls back to the dispatcher's default.
  pub retry: Option<RetryPolicy>,
  /// Falls back to the dispatcher's default.
  pub timeout: Option<Duration>,
}

impl DispatchRequest {
  pub fn new(uo_type: impl Into<String>, params: Params) -> Self {
    Self {
      uo_type: uo_type.into(),
      params,
      node_id: None,
      retry: None,
      timeout: None,
    }
  }

  pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
    self.node_id = Some(node_id.into());
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = Some(retry);
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// Dispatcher defaults.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
  pub measurement_timeout: Duration,
  pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self {
      measurement_timeout: Duration::from_secs(3600),
      retry: RetryPolicy::default(),
    }
  }
}

pub struct Dispatcher {
  registry: Arc<BackendRegistry>,
  validator: ParameterValidator,
  tracker: Arc<StatusTracker>,
  results: Arc<dyn ResultStore>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: DispatcherConfig,
}

impl Dispatcher {
  pub fn new(
    registry: Arc<BackendRegistry>,
    tracker: Arc<StatusTracker>,
    results: Arc<dyn ResultStore>,
  ) -> Self {
    Self {
      registry,
      validator: ParameterValidator::default(),
      tracker,
      results,
      notifier: Arc::new(NoopNotifier),
      config: DispatcherConfig::default(),
    }
  }

  pub fn with_validator(mut self, validator: ParameterValidator) -> Self {
    self.validator = validator;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_config(mut self, config: DispatcherConfig) -> Self {
    self.config = config;
    self
  }

  pub fn config(&self) -> &DispatcherConfig {
    &self.config
  }

  pub fn registry(&self) -> &Arc<BackendRegistry> {
    &self.registry
  }

  pub fn tracker(&self) -> &Arc<StatusTracker> {
    &self.tracker
  }

  pub(crate) fn notifier(&self) -> &Arc<dyn ExecutionNotifier> {
    &self.notifier
  }

  /// Check a type tag and parameters without creating an experiment.
  ///
  /// Returns the parsed type and the normalised parameter snapshot.
  pub async fn validate(
    &self,
    uo_type: &str,
    params: &Params,
  ) -> Result<(ExperimentType, Params), DispatchError> {
    let experiment_type: ExperimentType = uo_type.parse()?;

    let (snapshot, mut errors) = match self.validator.validate(experiment_type, params) {
      Ok(snapshot) => (snapshot, Vec::new()),
      Err(err) => (params.clone(), err.errors),
    };
    errors.extend(self.registry.validate(experiment_type, &snapshot).await?);

    if errors.is_empty() {
      Ok((experiment_type, snapshot))
    } else {
      Err(DispatchError::Validation(ValidationError {
        uo_type: experiment_type.to_string(),
        errors,
      }))
    }
  }

  /// Dispatch with default retry policy and timeout.
  pub async fn dispatch(&self, uo_type: &str, params: Params) -> Result<Experiment, DispatchError> {
    self.dispatch_request(DispatchRequest::new(uo_type, params)).await
  }

  /// Run one experiment to a terminal status.
  ///
  /// Refusals (unknown type, invalid parameters) are errors and leave no
  /// record. Measurement failures are not errors: the returned experiment is
  /// `failed` and carries the last error.
  #[instrument(
    name = "dispatch",
    skip(self, request),
    fields(uo_type = %request.uo_type, node_id = ?request.node_id)
  )]
  pub async fn dispatch_request(&self, request: DispatchRequest) -> Result<Experiment, DispatchError> {
    let (experiment_type, snapshot) = match self.validate(&request.uo_type, &request.params).await {
      Ok(validated) => validated,
      Err(e) => {
        warn!(error = %e, "dispatch_rejected");
        return Err(e);
      }
    };

    let retry = request.retry.unwrap_or(self.config.retry);
    let timeout = request.timeout.unwrap_or(self.config.measurement_timeout);

    let mut experiment = Experiment::new(experiment_type.as_str(), snapshot, request.node_id);
    self.record(&experiment);
    info!(experiment_id = %experiment.id, "experiment_created");

    let last_error = loop {
      let attempt = experiment.start_attempt()?;
      self.record(&experiment);
      info!(experiment_id = %experiment.id, attempt, "experiment_running");

      let err = match self.measure(&experiment, timeout).await {
        Ok(result) => {
          experiment.complete(result)?;
          self.persist(&experiment).await;
          self.record(&experiment);
          info!(experiment_id = %experiment.id, attempt, "experiment_completed");
          return Ok(experiment);
        }
        Err(err) => err,
      };

      if !err.is_retryable() || attempt >= retry.max_attempts() {
        break err;
      }
      warn!(
        experiment_id = %experiment.id,
        attempt,
        error = %err,
        delay = ?retry.retry_delay,
        "experiment_retrying"
      );
      tokio::time::sleep(retry.retry_delay).await;
    };

    experiment.fail(last_error.to_string())?;
    self.record(&experiment);
    warn!(
      experiment_id = %experiment.id,
      attempts = experiment.attempt_count,
      error = %last_error,
      "experiment_failed"
    );
    Ok(experiment)
  }

  async fn measure(&self, experiment: &Experiment, timeout: Duration) -> Result<serde_json::Value, BackendError> {
    let handle = self
      .registry
      .get_or_create(&experiment.uo_type)
      .await
      .map_err(|e| BackendError::Connection(e.to_string()))?;

    // queueing behind another measurement on the same instrument is not timed
    let mut session = handle.lock().await;
    session.ensure_connected().await?;
    tokio::time::timeout(timeout, session.measure(&experiment.parameters))
      .await
      .map_err(|_| BackendError::Timeout(timeout))?
  }

  async fn persist(&self, experiment: &Experiment) {
    let Some(result) = &experiment.result else {
      return;
    };
    if let Err(e) = self.results.store(&experiment.id, result).await {
      warn!(experiment_id = %experiment.id, error = %e, "result_store_failed");
    }
  }

  fn record(&self, experiment: &Experiment) {
    self.tracker.put(experiment.clone());
    self.notifier.notify(ExecutionEvent::ExperimentStatusChanged {
      experiment_id: experiment.id.clone(),
      node_id: experiment.node_id.clone(),
      status: experiment.status,
      attempt: experiment.attempt_count,
    });
  }
}
