use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

/// Free-form parameter object as written in the workflow JSON.
pub type Params = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub name: String,
  #[serde(default)]
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Shared labware, instrument, solution and board settings.
  ///
  /// Merged into every node's parameters; node keys win on collision.
  #[serde(default)]
  pub global_config: Params,
  #[serde(alias = "experiments")]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
  /// Linear execution order used by older workflow files instead of edges.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sequence: Option<Vec<String>>,
}
