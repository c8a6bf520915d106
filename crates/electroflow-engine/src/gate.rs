//! Operator confirmation gate.
//!
//! A node that requires confirmation parks here after its device actions
//! and before its measurement. The branch resumes when someone calls
//! [`ConfirmationGate::confirm`]; nothing else in the run is held up.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Operator's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
  Approve,
  Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
  #[error("no confirmation pending for node {node_id} in run {run_id}")]
  NotWaiting { run_id: String, node_id: String },

  #[error("confirmation timed out after {0:?}")]
  TimedOut(Duration),

  #[error("run cancelled while waiting for confirmation")]
  Cancelled,
}

/// An open confirmation prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
  pub run_id: String,
  pub node_id: String,
  pub message: String,
  pub requested_at: DateTime<Utc>,
}

struct Waiter {
  info: PendingConfirmation,
  reply: oneshot::Sender<Decision>,
}

type Key = (String, String);

/// Registry of branches waiting for an operator.
#[derive(Default)]
pub struct ConfirmationGate {
  waiting: Mutex<HashMap<Key, Waiter>>,
}

impl ConfirmationGate {
  pub fn new() -> Self {
    Self::default()
  }

  /// Park until a decision arrives, the timeout expires, or `cancel` fires.
  ///
  /// Without a timeout the wait is unbounded.
  pub async fn wait(
    &self,
    run_id: &str,
    node_id: &str,
    message: &str,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
  ) -> Result<Decision, GateError> {
    let key = (run_id.to_string(), node_id.to_string());
    let (reply, decision) = oneshot::channel();
    self.lock().insert(
      key.clone(),
      Waiter {
        info: PendingConfirmation {
          run_id: run_id.to_string(),
          node_id: node_id.to_string(),
          message: message.to_string(),
          requested_at: Utc::now(),
        },
        reply,
      },
    );
    let _registered = Registered { gate: self, key };
    info!(run_id = %run_id, node_id = %node_id, "confirmation_waiting");

    let deadline = async {
      match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending::<()>().await,
      }
    };

    let outcome = tokio::select! {
      decision = decision => decision.map_err(|_| GateError::Cancelled),
      _ = deadline => Err(GateError::TimedOut(timeout.unwrap_or_default())),
      _ = cancel.cancelled() => Err(GateError::Cancelled),
    };

    outcome
  }

  /// Answer a waiting branch.
  pub fn confirm(&self, run_id: &str, node_id: &str, decision: Decision) -> Result<(), GateError> {
    let key = (run_id.to_string(), node_id.to_string());
    let waiter = self.lock().remove(&key).ok_or_else(|| GateError::NotWaiting {
      run_id: run_id.to_string(),
      node_id: node_id.to_string(),
    })?;

    info!(run_id = %run_id, node_id = %node_id, decision = ?decision, "confirmation_received");
    waiter.reply.send(decision).map_err(|_| GateError::NotWaiting {
      run_id: run_id.to_string(),
      node_id: node_id.to_string(),
    })
  }

  /// Open prompts, oldest first.
  pub fn pending(&self) -> Vec<PendingConfirmation> {
    let mut pending: Vec<_> = self.lock().values().map(|w| w.info.clone()).collect();
    pending.sort_by_key(|p| p.requested_at);
    pending
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Key, Waiter>> {
    self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Withdraws the prompt however the wait ends, including when it is dropped.
struct Registered<'a> {
  gate: &'a ConfirmationGate,
  key: Key,
}

impl Drop for Registered<'_> {
  fn drop(&mut self) {
    self.gate.lock().remove(&self.key);
  }
}
