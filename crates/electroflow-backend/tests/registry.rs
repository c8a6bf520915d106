//! Backend registry behaviour: lazy connection, reuse, teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use electroflow_backend::{
  Backend, BackendError, BackendRegistry, ExperimentType, RegistryError, SimulatedBackend,
};
use electroflow_config::Params;
use serde_json::json;

/// Counts lifecycle calls and fails the first `connect_failures` connects.
#[derive(Clone, Default)]
struct Counters {
  connects: Arc<AtomicUsize>,
  disconnects: Arc<AtomicUsize>,
  connect_failures: Arc<AtomicUsize>,
}

struct CountingBackend {
  counters: Counters,
}

#[async_trait]
impl Backend for CountingBackend {
  fn experiment_type(&self) -> ExperimentType {
    ExperimentType::Ocv
  }

  async fn connect(&mut self) -> Result<(), BackendError> {
    self.counters.connects.fetch_add(1, Ordering::SeqCst);
    let remaining = self.counters.connect_failures.load(Ordering::SeqCst);
    if remaining > 0 {
      self.counters.connect_failures.store(remaining - 1, Ordering::SeqCst);
      return Err(BackendError::Connection("port busy".to_string()));
    }
    Ok(())
  }

  async fn execute_measurement(&mut self, _params: &Params) -> Result<serde_json::Value, BackendError> {
    Ok(json!({ "summary": { "ok": true } }))
  }

  async fn disconnect(&mut self) -> Result<(), BackendError> {
    self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

fn counting_registry(counters: &Counters) -> BackendRegistry {
  let mut registry = BackendRegistry::new();
  let counters = counters.clone();
  registry.register(ExperimentType::Ocv, move || {
    Box::new(CountingBackend {
      counters: counters.clone(),
    }) as Box<dyn Backend>
  });
  registry
}

#[tokio::test]
async fn test_handle_reused_and_connected_once() {
  let counters = Counters::default();
  let registry = counting_registry(&counters);

  let first = registry.get_or_create("OCV").await.unwrap();
  let second = registry.get_or_create("ocv").await.unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
  assert_eq!(first.connect_count(), 1);
}

#[tokio::test]
async fn test_failed_connect_retried_on_next_use() {
  let counters = Counters::default();
  counters.connect_failures.store(1, Ordering::SeqCst);
  let registry = counting_registry(&counters);

  let err = registry.get_or_create("OCV").await.unwrap_err();
  assert!(matches!(err, RegistryError::Connect { .. }));

  let handle = registry.get_or_create("OCV").await.unwrap();
  assert!(handle.is_connected().await);
  assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_and_unregistered_types() {
  let registry = counting_registry(&Counters::default());

  assert!(matches!(
    registry.get_or_create("XRD").await,
    Err(RegistryError::UnknownType(_))
  ));
  assert!(matches!(
    registry.get_or_create("CVA").await,
    Err(RegistryError::NotRegistered(_))
  ));
}

#[tokio::test]
async fn test_validate_does_not_connect() {
  let registry = BackendRegistry::simulated();
  let params = json!({ "duration": 1.0, "sample_interval": 5.0 });

  let errors = registry
    .validate(ExperimentType::Ocv, params.as_object().unwrap())
    .await
    .unwrap();

  assert_eq!(errors.len(), 1);
  let handle = registry.handle(ExperimentType::Ocv).await.unwrap();
  assert!(!handle.is_connected().await);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
  let counters = Counters::default();
  let registry = counting_registry(&counters);
  registry.get_or_create("OCV").await.unwrap();

  registry.shutdown().await;
  registry.shutdown().await;
  assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);

  // reconnects lazily afterwards
  let handle = registry.get_or_create("OCV").await.unwrap();
  assert!(handle.is_connected().await);
  assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_simulated_registry_covers_all_types() {
  let registry = BackendRegistry::simulated();
  for uo_type in ExperimentType::ALL {
    assert!(registry.is_registered(uo_type));
    let handle = registry.get_or_create(uo_type.as_str()).await.unwrap();
    let result = handle.execute(&Params::new()).await.unwrap();
    assert_eq!(result["technique"], json!(uo_type.as_str()));
  }
  // the simulated backend is usable standalone too
  assert!(!SimulatedBackend::new(ExperimentType::Cp).is_connected());
}
