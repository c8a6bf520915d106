//! Execution events and notifiers for observability.
//!
//! Events are emitted during workflow execution to allow consumers to observe
//! progress, answer confirmation prompts, stream to UIs, etc.

use electroflow_store::ExperimentStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::RunStatus;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// Workflow execution has started.
  RunStarted { run_id: String, workflow_name: String },

  /// A node has been picked up for execution.
  NodeStarted { run_id: String, node_id: String },

  /// A node is waiting for an operator's approval.
  ConfirmationRequested {
    run_id: String,
    node_id: String,
    message: String,
  },

  /// An experiment moved to a new status.
  ExperimentStatusChanged {
    experiment_id: String,
    node_id: Option<String>,
    status: ExperimentStatus,
    attempt: u32,
  },

  /// A node's experiment completed.
  NodeCompleted {
    run_id: String,
    node_id: String,
    experiment_id: String,
  },

  /// A node has failed.
  NodeFailed {
    run_id: String,
    node_id: String,
    error: String,
  },

  /// A node was not executed (condition false, or blocked upstream).
  NodeSkipped {
    run_id: String,
    node_id: String,
    reason: String,
  },

  /// Workflow execution has finished.
  RunCompleted { run_id: String, status: RunStatus },
}

/// Trait for receiving execution events.
///
/// The engine calls `notify` for each event - implementations decide
/// what to do with them (persist, broadcast, log, ignore, etc.).
pub trait ExecutionNotifier: Send + Sync {
  /// Called when an execution event occurs.
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Sending never blocks the engine. Volume is a handful of events per node.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
