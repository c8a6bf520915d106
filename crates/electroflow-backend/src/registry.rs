//! Backend registry.
//!
//! Backends are constructed on first use and connected lazily. Each
//! experiment type gets exactly one [`BackendHandle`] for the lifetime of the
//! registry; the handle's lock is what serialises measurements on the same
//! instrument.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use electroflow_config::Params;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{BackendError, RegistryError};
use crate::experiment_type::ExperimentType;
use crate::simulated::SimulatedBackend;

/// Builds a fresh, unconnected backend.
pub type BackendConstructor = Arc<dyn Fn() -> Box<dyn Backend> + Send + Sync>;

struct Slot {
  backend: Box<dyn Backend>,
  connected: bool,
}

/// The single live backend for one experiment type.
pub struct BackendHandle {
  experiment_type: ExperimentType,
  slot: Mutex<Slot>,
  connects: AtomicUsize,
}

impl BackendHandle {
  fn new(experiment_type: ExperimentType, backend: Box<dyn Backend>) -> Self {
    Self {
      experiment_type,
      slot: Mutex::new(Slot {
        backend,
        connected: false,
      }),
      connects: AtomicUsize::new(0),
    }
  }

  pub fn experiment_type(&self) -> ExperimentType {
    self.experiment_type
  }

  pub async fn is_connected(&self) -> bool {
    self.slot.lock().await.connected
  }

  /// Number of successful connects made through this handle.
  pub fn connect_count(&self) -> usize {
    self.connects.load(Ordering::SeqCst)
  }

  /// Connect unless already connected.
  ///
  /// On failure the handle stays unconnected, so the next call tries again.
  pub async fn ensure_connected(&self) -> Result<(), BackendError> {
    let mut slot = self.slot.lock().await;
    self.connect_locked(&mut slot).await
  }

  async fn connect_locked(&self, slot: &mut Slot) -> Result<(), BackendError> {
    if slot.connected {
      return Ok(());
    }
    slot.backend.connect().await?;
    slot.connected = true;
    self.connects.fetch_add(1, Ordering::SeqCst);
    info!(uo_type = %self.experiment_type, "backend_connected");
    Ok(())
  }

  /// Technique-specific parameter problems. Never connects.
  pub async fn validate(&self, params: &Params) -> Vec<String> {
    self.slot.lock().await.backend.validate_parameters(params)
  }

  /// Take the instrument exclusively.
  ///
  /// Waiting here is queueing, not measuring: callers time only the work
  /// done through the returned session.
  pub async fn lock(&self) -> BackendSession<'_> {
    BackendSession {
      handle: self,
      slot: self.slot.lock().await,
    }
  }

  /// Run one measurement while holding the instrument exclusively.
  pub async fn execute(&self, params: &Params) -> Result<serde_json::Value, BackendError> {
    let mut session = self.lock().await;
    session.ensure_connected().await?;
    session.measure(params).await
  }

  /// Disconnect if connected. Returns whether a disconnect happened.
  pub async fn disconnect(&self) -> Result<bool, BackendError> {
    let mut slot = self.slot.lock().await;
    if !slot.connected {
      return Ok(false);
    }
    slot.connected = false;
    slot.backend.disconnect().await?;
    Ok(true)
  }
}

impl fmt::Debug for BackendHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackendHandle")
      .field("experiment_type", &self.experiment_type)
      .field("connects", &self.connect_count())
      .finish()
  }
}

/// Exclusive access to one instrument, held for as long as it lives.
pub struct BackendSession<'a> {
  handle: &'a BackendHandle,
  slot: MutexGuard<'a, Slot>,
}

impl BackendSession<'_> {
  pub async fn ensure_connected(&mut self) -> Result<(), BackendError> {
    self.handle.connect_locked(&mut self.slot).await
  }

  /// Run one measurement. Connect first with [`Self::ensure_connected`].
  pub async fn measure(&mut self, params: &Params) -> Result<serde_json::Value, BackendError> {
    if !self.slot.connected {
      return Err(BackendError::Connection(format!(
        "{} backend is not connected",
        self.handle.experiment_type
      )));
    }
    self.slot.backend.execute_measurement(params).await
  }
}

/// Closed mapping from experiment type to backend constructor.
///
/// Owned by the process entry point and shared by reference; there is no
/// global instance.
pub struct BackendRegistry {
  constructors: HashMap<ExperimentType, BackendConstructor>,
  handles: Mutex<BTreeMap<ExperimentType, Arc<BackendHandle>>>,
}

impl BackendRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self {
      constructors: HashMap::new(),
      handles: Mutex::new(BTreeMap::new()),
    }
  }

  /// A registry with the simulated potentiostat for every technique.
  pub fn simulated() -> Self {
    let mut registry = Self::new();
    for uo_type in ExperimentType::ALL {
      registry.register(uo_type, move || {
        Box::new(SimulatedBackend::new(uo_type)) as Box<dyn Backend>
      });
    }
    registry
  }

  /// Register (or replace) the constructor for a type.
  pub fn register<F>(&mut self, uo_type: ExperimentType, constructor: F)
  where
    F: Fn() -> Box<dyn Backend> + Send + Sync + 'static,
  {
    self.constructors.insert(uo_type, Arc::new(constructor));
  }

  pub fn is_registered(&self, uo_type: ExperimentType) -> bool {
    self.constructors.contains_key(&uo_type)
  }

  /// Get the handle for a type, constructing it if needed. Does not connect.
  pub async fn handle(&self, uo_type: ExperimentType) -> Result<Arc<BackendHandle>, RegistryError> {
    let mut handles = self.handles.lock().await;
    if let Some(handle) = handles.get(&uo_type) {
      return Ok(handle.clone());
    }

    let constructor = self
      .constructors
      .get(&uo_type)
      .ok_or_else(|| RegistryError::NotRegistered(uo_type.to_string()))?;
    let handle = Arc::new(BackendHandle::new(uo_type, constructor()));
    handles.insert(uo_type, handle.clone());
    Ok(handle)
  }

  /// Resolve a type tag to a connected handle.
  pub async fn get_or_create(&self, uo_type: &str) -> Result<Arc<BackendHandle>, RegistryError> {
    let experiment_type: ExperimentType = uo_type.parse()?;
    let handle = self.handle(experiment_type).await?;
    handle
      .ensure_connected()
      .await
      .map_err(|source| RegistryError::Connect {
        uo_type: experiment_type.to_string(),
        source,
      })?;
    Ok(handle)
  }

  /// Backend-specific parameter problems for a type, without connecting.
  pub async fn validate(
    &self,
    uo_type: ExperimentType,
    params: &Params,
  ) -> Result<Vec<String>, RegistryError> {
    Ok(self.handle(uo_type).await?.validate(params).await)
  }

  /// Disconnect every connected backend.
  ///
  /// Safe to call more than once; handles stay registered and reconnect on
  /// next use.
  pub async fn shutdown(&self) {
    let handles: Vec<Arc<BackendHandle>> = self.handles.lock().await.values().cloned().collect();
    for handle in handles {
      match handle.disconnect().await {
        Ok(true) => info!(uo_type = %handle.experiment_type(), "backend_disconnected"),
        Ok(false) => {}
        Err(e) => warn!(
          uo_type = %handle.experiment_type(),
          error = %e,
          "backend_disconnect_failed"
        ),
      }
    }
  }
}

impl Default for BackendRegistry {
  fn default() -> Self {
    Self::new()
  }
}
