use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("failed to parse workflow: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("node at position {0} has an empty id")]
  EmptyNodeId(usize),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("workflow contains a cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },

  #[error("no entry points found (all nodes have incoming edges)")]
  NoEntryPoints,

  #[error("condition on node {node} references unknown node {reference}")]
  UnknownConditionReference { node: String, reference: String },

  #[error("invalid node {node}: {reason}")]
  InvalidNode { node: String, reason: String },
}
