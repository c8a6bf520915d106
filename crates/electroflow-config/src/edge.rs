use serde::{Deserialize, Serialize};

use crate::condition::ConditionDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub source: String,
  pub target: String,
  /// Gate on the source node's result; the edge is only followed when true.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<ConditionDef>,
}
