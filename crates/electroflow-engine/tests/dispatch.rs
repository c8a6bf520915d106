//! Dispatcher behaviour: refusals, state machine, retries, persistence.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use electroflow_backend::{Backend, BackendError, BackendRegistry, ExperimentType};
use electroflow_config::Params;
use electroflow_engine::{DispatchError, DispatchRequest, Dispatcher, RetryPolicy};
use electroflow_store::{
  ExperimentStatus, FsResultStore, MemoryResultStore, ResultStore, StatusTracker, StoreError,
};
use serde_json::{Value, json};

fn params(value: Value) -> Params {
  value.as_object().cloned().unwrap()
}

fn dispatcher_with(registry: BackendRegistry, results: Arc<dyn ResultStore>) -> Dispatcher {
  Dispatcher::new(
    Arc::new(registry),
    Arc::new(StatusTracker::default()),
    results,
  )
}

fn simulated_dispatcher() -> (Dispatcher, Arc<MemoryResultStore>) {
  let results = Arc::new(MemoryResultStore::new());
  (
    dispatcher_with(BackendRegistry::simulated(), results.clone()),
    results,
  )
}

/// Counts measurement attempts and fails each one with the given error.
struct FailingBackend {
  attempts: Arc<AtomicUsize>,
  error: BackendError,
}

#[async_trait]
impl Backend for FailingBackend {
  fn experiment_type(&self) -> ExperimentType {
    ExperimentType::Cp
  }

  async fn connect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }

  async fn execute_measurement(&mut self, _params: &Params) -> Result<Value, BackendError> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    Err(self.error.clone())
  }

  async fn disconnect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }
}

fn failing_registry(attempts: &Arc<AtomicUsize>, error: BackendError) -> BackendRegistry {
  let mut registry = BackendRegistry::simulated();
  let attempts = attempts.clone();
  registry.register(ExperimentType::Cp, move || {
    Box::new(FailingBackend {
      attempts: attempts.clone(),
      error: error.clone(),
    }) as Box<dyn Backend>
  });
  registry
}

/// Never answers within a reasonable time.
struct StuckBackend;

#[async_trait]
impl Backend for StuckBackend {
  fn experiment_type(&self) -> ExperimentType {
    ExperimentType::Ocv
  }

  async fn connect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }

  async fn execute_measurement(&mut self, _params: &Params) -> Result<Value, BackendError> {
    tokio::time::sleep(Duration::from_secs(600)).await;
    Ok(json!({}))
  }

  async fn disconnect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }
}

/// Takes five seconds per measurement.
struct SlowBackend;

#[async_trait]
impl Backend for SlowBackend {
  fn experiment_type(&self) -> ExperimentType {
    ExperimentType::Ocv
  }

  async fn connect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }

  async fn execute_measurement(&mut self, _params: &Params) -> Result<Value, BackendError> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Ok(json!({ "summary": { "ocv": 0.21 } }))
  }

  async fn disconnect(&mut self) -> Result<(), BackendError> {
    Ok(())
  }
}

struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
  async fn store(&self, _experiment_id: &str, _result: &Value) -> Result<(), StoreError> {
    Err(StoreError::Io(std::io::Error::other("disk full")))
  }

  async fn load(&self, experiment_id: &str) -> Result<Value, StoreError> {
    Err(StoreError::NotFound(experiment_id.to_string()))
  }
}

#[tokio::test]
async fn test_dispatch_completes_and_persists() {
  let (dispatcher, results) = simulated_dispatcher();

  let experiment = dispatcher
    .dispatch("OCV", params(json!({ "duration": 10, "sample_interval": 1 })))
    .await
    .unwrap();

  assert_eq!(experiment.status, ExperimentStatus::Completed);
  assert_eq!(experiment.attempt_count, 1);
  assert_eq!(
    experiment.status_sequence(),
    vec![
      ExperimentStatus::Pending,
      ExperimentStatus::Running,
      ExperimentStatus::Completed
    ]
  );
  assert!(experiment.completed_at.is_some());

  let stored = results.load(&experiment.id).await.unwrap();
  assert_eq!(Some(&stored), experiment.result.as_ref());

  let tracked = dispatcher.tracker().get(&experiment.id).unwrap();
  assert_eq!(tracked.status, ExperimentStatus::Completed);
}

#[tokio::test]
async fn test_unit_strings_are_normalised_in_snapshot() {
  let (dispatcher, _) = simulated_dispatcher();

  let experiment = dispatcher
    .dispatch(
      "CVA",
      params(json!({
        "start_voltage": "-500mV",
        "end_voltage": "0.5V",
        "scan_rate": "50mV/s",
        "cycles": 2
      })),
    )
    .await
    .unwrap();

  assert_eq!(experiment.parameters["start_voltage"], json!(-0.5));
  assert_eq!(experiment.parameters["scan_rate"], json!(0.05));
  assert_eq!(experiment.parameters["cycles"], json!(2));
}

#[tokio::test]
async fn test_unknown_type_creates_no_record() {
  let (dispatcher, _) = simulated_dispatcher();

  let err = dispatcher.dispatch("XRD", Params::new()).await.unwrap_err();

  assert!(matches!(err, DispatchError::UnknownType(ref tag) if tag == "XRD"));
  assert!(dispatcher.tracker().is_empty());
}

#[tokio::test]
async fn test_validation_collects_every_error() {
  let (dispatcher, _) = simulated_dispatcher();

  let err = dispatcher
    .dispatch(
      "CVA",
      params(json!({ "start_voltage": 3.0, "scan_rate": 5.0, "cycles": 1.5 })),
    )
    .await
    .unwrap_err();

  match err {
    DispatchError::Validation(validation) => {
      assert_eq!(validation.uo_type, "CVA");
      assert_eq!(validation.errors.len(), 3);
    }
    other => panic!("unexpected error: {:?}", other),
  }
  assert!(dispatcher.tracker().is_empty());
}

#[tokio::test]
async fn test_backend_cross_field_check() {
  let (dispatcher, _) = simulated_dispatcher();

  let err = dispatcher
    .dispatch("OCV", params(json!({ "duration": 1, "sample_interval": 5 })))
    .await
    .unwrap_err();

  assert!(matches!(err, DispatchError::Validation(_)));
  assert!(dispatcher.tracker().is_empty());
  // validation never connects a backend
  let handle = dispatcher
    .registry()
    .handle(ExperimentType::Ocv)
    .await
    .unwrap();
  assert!(!handle.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let registry = failing_registry(&attempts, BackendError::Execution("overload".to_string()));
  let dispatcher = dispatcher_with(registry, Arc::new(MemoryResultStore::new()));

  let started = tokio::time::Instant::now();
  let experiment = dispatcher
    .dispatch_request(
      DispatchRequest::new("CP", params(json!({ "current": 0.001 })))
        .with_retry(RetryPolicy::new(2, Duration::from_secs(5))),
    )
    .await
    .unwrap();

  assert_eq!(attempts.load(Ordering::SeqCst), 3);
  assert_eq!(experiment.status, ExperimentStatus::Failed);
  assert_eq!(experiment.attempt_count, 3);
  assert!(experiment.error.as_deref().unwrap().contains("overload"));
  assert_eq!(
    experiment.status_sequence(),
    vec![
      ExperimentStatus::Pending,
      ExperimentStatus::Running,
      ExperimentStatus::Running,
      ExperimentStatus::Running,
      ExperimentStatus::Failed
    ]
  );
  assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_not_retried() {
  let attempts = Arc::new(AtomicUsize::new(0));
  let registry = failing_registry(&attempts, BackendError::Fatal("cell open".to_string()));
  let dispatcher = dispatcher_with(registry, Arc::new(MemoryResultStore::new()));

  let experiment = dispatcher
    .dispatch_request(
      DispatchRequest::new("CP", params(json!({ "current": 0.001 })))
        .with_retry(RetryPolicy::new(3, Duration::from_secs(1))),
    )
    .await
    .unwrap();

  assert_eq!(attempts.load(Ordering::SeqCst), 1);
  assert_eq!(experiment.status, ExperimentStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_measurement_timeout_is_retried() {
  let mut registry = BackendRegistry::new();
  registry.register(ExperimentType::Ocv, || Box::new(StuckBackend) as Box<dyn Backend>);
  let dispatcher = dispatcher_with(registry, Arc::new(MemoryResultStore::new()));

  let experiment = dispatcher
    .dispatch_request(
      DispatchRequest::new("OCV", Params::new())
        .with_retry(RetryPolicy::new(1, Duration::from_secs(1)))
        .with_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap();

  assert_eq!(experiment.status, ExperimentStatus::Failed);
  assert_eq!(experiment.attempt_count, 2);
  assert!(experiment.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_store_failure_keeps_experiment_completed() {
  let dispatcher = dispatcher_with(BackendRegistry::simulated(), Arc::new(BrokenStore));

  let experiment = dispatcher
    .dispatch("OCV", params(json!({ "duration": 2, "sample_interval": 1 })))
    .await
    .unwrap();

  assert_eq!(experiment.status, ExperimentStatus::Completed);
  assert!(experiment.result.is_some());
}

#[tokio::test]
async fn test_results_written_to_filesystem() {
  let dir = tempfile::tempdir().unwrap();
  let dispatcher = dispatcher_with(
    BackendRegistry::simulated(),
    Arc::new(FsResultStore::new(dir.path())),
  );

  let experiment = dispatcher
    .dispatch(
      "PEIS",
      params(json!({
        "dc_voltage": 0.0,
        "ac_amplitude": "10mV",
        "frequency_start": "1Hz",
        "frequency_end": "100kHz"
      })),
    )
    .await
    .unwrap();

  let path = dir.path().join(&experiment.id).join("results.json");
  let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
  assert_eq!(written["technique"], json!("PEIS"));
}

#[tokio::test]
async fn test_shared_type_connects_once() {
  let (dispatcher, _) = simulated_dispatcher();

  for _ in 0..3 {
    dispatcher
      .dispatch("OCV", params(json!({ "duration": 1, "sample_interval": 0.5 })))
      .await
      .unwrap();
  }

  let handle = dispatcher
    .registry()
    .handle(ExperimentType::Ocv)
    .await
    .unwrap();
  assert_eq!(handle.connect_count(), 1);
  assert_eq!(dispatcher.tracker().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_for_instrument_is_not_timed() {
  let mut registry = BackendRegistry::new();
  registry.register(ExperimentType::Ocv, || Box::new(SlowBackend) as Box<dyn Backend>);
  let dispatcher = dispatcher_with(registry, Arc::new(MemoryResultStore::new()));

  let request = || {
    DispatchRequest::new("OCV", Params::new())
      .with_retry(RetryPolicy::none())
      .with_timeout(Duration::from_secs(8))
  };
  let started = tokio::time::Instant::now();
  let (a, b, c) = tokio::join!(
    dispatcher.dispatch_request(request()),
    dispatcher.dispatch_request(request()),
    dispatcher.dispatch_request(request()),
  );

  for experiment in [a.unwrap(), b.unwrap(), c.unwrap()] {
    assert_eq!(experiment.status, ExperimentStatus::Completed);
    assert_eq!(experiment.attempt_count, 1);
  }
  // one instrument, so the measurements ran back to back
  assert!(started.elapsed() >= Duration::from_secs(15));
}
