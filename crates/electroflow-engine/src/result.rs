//! Execution result types.

use chrono::{DateTime, Utc};
use electroflow_store::Experiment;
use serde::{Deserialize, Serialize};

/// Final state of one node in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Completed,
  Failed,
  /// Condition false, or no incoming edge was taken.
  Skipped,
  /// An upstream node failed or was blocked.
  Blocked,
  /// The run was cancelled before this node finished.
  Cancelled,
}

impl NodeStatus {
  /// Whether downstream nodes must not run.
  pub fn blocks_downstream(self) -> bool {
    matches!(self, NodeStatus::Failed | NodeStatus::Blocked | NodeStatus::Cancelled)
  }
}

/// What happened to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
  pub node_id: String,
  pub uo_type: String,
  pub status: NodeStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub experiment: Option<Experiment>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Values returned by device actions, e.g. temperature readings.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub device_readings: Vec<serde_json::Value>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl NodeReport {
  pub(crate) fn new(node_id: &str, uo_type: &str, status: NodeStatus) -> Self {
    Self {
      node_id: node_id.to_string(),
      uo_type: uo_type.to_string(),
      status,
      experiment: None,
      error: None,
      device_readings: Vec::new(),
      started_at: None,
      completed_at: None,
    }
  }

  pub(crate) fn with_error(mut self, error: impl Into<String>) -> Self {
    self.error = Some(error.into());
    self
  }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Succeeded,
  /// Finished, but at least one node failed or was blocked.
  CompletedWithErrors,
  Cancelled,
}

/// Result of a complete workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
  pub run_id: String,
  pub workflow_name: String,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
  /// One report per node, in the order nodes were resolved.
  pub nodes: Vec<NodeReport>,
  /// Every experiment created by the run, in submission order.
  pub experiments: Vec<Experiment>,
}

impl RunResult {
  pub fn node(&self, node_id: &str) -> Option<&NodeReport> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  /// Node ids in resolution order.
  pub fn order(&self) -> Vec<&str> {
    self.nodes.iter().map(|n| n.node_id.as_str()).collect()
  }
}
