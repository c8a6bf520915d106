use std::time::Duration;

use electroflow_config::{ConditionDef, DeviceAction, DeviceFamily, NodeDef, Params};

use crate::error::WorkflowError;

/// A validated workflow step.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub id: String,
  pub uo_type: String,
  pub label: String,
  pub params: Params,
  pub device_actions: Vec<DeviceAction>,
  /// Extra attempts after the first; `None` falls back to the engine default.
  pub retry_count: Option<u32>,
  pub retry_delay: Option<Duration>,
  pub timeout: Option<Duration>,
  pub condition: Option<ConditionDef>,
  pub requires_confirmation: bool,
  pub confirmation_message: Option<String>,
  pub best_effort: bool,
}

impl Node {
  pub(crate) fn from_def(def: NodeDef) -> Result<Self, WorkflowError> {
    let retry_delay = seconds(&def.id, "retry_delay", def.retry_delay)?;
    let timeout = seconds(&def.id, "timeout", def.timeout)?;
    if timeout.is_some_and(|t| t.is_zero()) {
      return Err(WorkflowError::InvalidNode {
        node: def.id,
        reason: "timeout must be greater than zero".to_string(),
      });
    }

    if def
      .condition
      .as_ref()
      .is_some_and(|c| c.experiment_id.is_none())
    {
      return Err(WorkflowError::InvalidNode {
        node: def.id,
        reason: "node condition must name an experiment_id".to_string(),
      });
    }

    Ok(Self {
      id: def.id,
      uo_type: def.uo_type,
      label: def.label,
      params: def.params,
      device_actions: def.device_actions,
      retry_count: def.retry_count,
      retry_delay,
      timeout,
      condition: def.condition,
      requires_confirmation: def.requires_confirmation,
      confirmation_message: def.confirmation_message,
      best_effort: def.best_effort,
    })
  }

  /// Global config merged with this node's params; node keys win.
  pub fn merged_params(&self, global: &Params) -> Params {
    let mut merged = global.clone();
    for (key, value) in &self.params {
      merged.insert(key.clone(), value.clone());
    }
    merged
  }

  /// Human-readable name for logs and prompts.
  pub fn display_name(&self) -> &str {
    if self.label.is_empty() {
      &self.id
    } else {
      &self.label
    }
  }

  /// Whether any explicit action targets the given device family.
  pub fn touches(&self, family: DeviceFamily) -> bool {
    self.device_actions.iter().any(|a| a.family() == family)
  }
}

fn seconds(node: &str, field: &str, value: Option<f64>) -> Result<Option<Duration>, WorkflowError> {
  value
    .map(|secs| {
      Duration::try_from_secs_f64(secs).map_err(|_| WorkflowError::InvalidNode {
        node: node.to_string(),
        reason: format!("{} must be a non-negative number of seconds, got {}", field, secs),
      })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn node_def(value: serde_json::Value) -> NodeDef {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_merged_params_node_wins() {
    let node = Node::from_def(node_def(json!({
      "id": "ocv",
      "type": "OCV",
      "params": { "duration": 5, "electrolyte": "KOH" }
    })))
    .unwrap();

    let global = json!({ "electrolyte": "NaCl", "cell": "A1" });
    let merged = node.merged_params(global.as_object().unwrap());

    assert_eq!(merged["electrolyte"], json!("KOH"));
    assert_eq!(merged["cell"], json!("A1"));
    assert_eq!(merged["duration"], json!(5));
  }

  #[test]
  fn test_negative_retry_delay_rejected() {
    let result = Node::from_def(node_def(json!({
      "id": "ocv",
      "type": "OCV",
      "retry_delay": -1.0
    })));

    assert!(matches!(result, Err(WorkflowError::InvalidNode { .. })));
  }

  #[test]
  fn test_durations_resolved() {
    let node = Node::from_def(node_def(json!({
      "id": "cv",
      "uo_type": "CVA",
      "retry_delay": 0.5,
      "timeout": 30
    })))
    .unwrap();

    assert_eq!(node.retry_delay, Some(Duration::from_millis(500)));
    assert_eq!(node.timeout, Some(Duration::from_secs(30)));
    assert_eq!(node.display_name(), "cv");
  }
}
