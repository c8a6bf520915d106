use serde::{Deserialize, Serialize};

use crate::action::DeviceAction;
use crate::condition::ConditionDef;
use crate::workflow::Params;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  /// Experiment type tag, e.g. "OCV" or "CVA".
  #[serde(rename = "type", alias = "uo_type")]
  pub uo_type: String,
  #[serde(default)]
  pub label: String,
  #[serde(default, alias = "parameters")]
  pub params: Params,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub device_actions: Vec<DeviceAction>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_count: Option<u32>,
  /// Seconds to wait between attempts.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_delay: Option<f64>,
  /// Measurement timeout in seconds.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<ConditionDef>,
  #[serde(default, alias = "requires_human_check")]
  pub requires_confirmation: bool,
  #[serde(
    default,
    alias = "human_message",
    skip_serializing_if = "Option::is_none"
  )]
  pub confirmation_message: Option<String>,
  /// Log device action failures instead of failing the node.
  #[serde(default)]
  pub best_effort: bool,
}
