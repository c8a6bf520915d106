use std::fmt;

use serde::{Deserialize, Serialize};

/// A threshold test against a field of a completed experiment's result.
///
/// ```json
/// { "experiment_id": "ocv", "parameter": "final_voltage", "operator": ">=", "value": 0.8 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDef {
  /// Node whose experiment result is inspected.
  ///
  /// Defaults to the edge source for edge conditions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub experiment_id: Option<String>,
  /// Dotted path into the result object, e.g. `summary.peak_current`.
  pub parameter: String,
  pub operator: Operator,
  pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
  #[serde(rename = "==")]
  Eq,
  #[serde(rename = "!=")]
  Ne,
  #[serde(rename = ">")]
  Gt,
  #[serde(rename = "<")]
  Lt,
  #[serde(rename = ">=")]
  Ge,
  #[serde(rename = "<=")]
  Le,
}

impl fmt::Display for Operator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Operator::Eq => "==",
      Operator::Ne => "!=",
      Operator::Gt => ">",
      Operator::Lt => "<",
      Operator::Ge => ">=",
      Operator::Le => "<=",
    };
    f.write_str(s)
  }
}
