use std::collections::HashMap;

use electroflow_config::{EdgeDef, Params, WorkflowDef};
use tracing::debug;

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::Node;

/// A structurally valid workflow, ready for execution.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
  pub name: String,
  pub version: String,
  pub description: Option<String>,
  pub global_config: Params,
  nodes: Vec<Node>,
  index: HashMap<String, usize>,
  edges: Vec<EdgeDef>,
  graph: Graph,
}

impl WorkflowDefinition {
  /// Parse and validate a workflow from its JSON text.
  pub fn load(raw_json: &str) -> Result<Self, WorkflowError> {
    let def: WorkflowDef = serde_json::from_str(raw_json)?;
    Self::from_def(def)
  }

  /// Validate an already-parsed workflow.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut nodes = Vec::with_capacity(def.nodes.len());
    let mut index = HashMap::with_capacity(def.nodes.len());

    for (position, node_def) in def.nodes.into_iter().enumerate() {
      if node_def.id.trim().is_empty() {
        return Err(WorkflowError::EmptyNodeId(position));
      }
      if index.contains_key(&node_def.id) {
        return Err(WorkflowError::DuplicateNode(node_def.id));
      }
      index.insert(node_def.id.clone(), nodes.len());
      nodes.push(Node::from_def(node_def)?);
    }

    let edges = match def.sequence {
      Some(sequence) if def.edges.is_empty() => sequence
        .windows(2)
        .map(|pair| EdgeDef {
          source: pair[0].clone(),
          target: pair[1].clone(),
          condition: None,
        })
        .collect(),
      _ => def.edges,
    };

    for edge in &edges {
      if !index.contains_key(&edge.source) || !index.contains_key(&edge.target) {
        return Err(WorkflowError::InvalidEdge {
          from: edge.source.clone(),
          to: edge.target.clone(),
        });
      }
      if edge.source == edge.target {
        return Err(WorkflowError::Cycle {
          path: vec![edge.source.clone(), edge.target.clone()],
        });
      }
    }

    let references = nodes
      .iter()
      .filter_map(|n| n.condition.as_ref().map(|c| (&n.id, c)))
      .chain(
        edges
          .iter()
          .filter_map(|e| e.condition.as_ref().map(|c| (&e.target, c))),
      );
    for (owner, condition) in references {
      if let Some(reference) = &condition.experiment_id {
        if !index.contains_key(reference) {
          return Err(WorkflowError::UnknownConditionReference {
            node: owner.clone(),
            reference: reference.clone(),
          });
        }
      }
    }

    let node_ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let graph = Graph::new(&node_ids, &edges);

    if graph.entry_points().is_empty() {
      return Err(WorkflowError::NoEntryPoints);
    }
    if let Some(path) = graph.find_cycle(&node_ids) {
      return Err(WorkflowError::Cycle { path });
    }

    debug!(
      workflow = %def.name,
      nodes = nodes.len(),
      edges = edges.len(),
      "workflow_loaded"
    );

    Ok(Self {
      name: def.name,
      version: def.version,
      description: def.description,
      global_config: def.global_config,
      nodes,
      index,
      edges,
      graph,
    })
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn edges(&self) -> &[EdgeDef] {
    &self.edges
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|&i| &self.nodes[i])
  }

  /// Like `get_node`, but as an error.
  pub fn node(&self, node_id: &str) -> Result<&Node, WorkflowError> {
    self
      .get_node(node_id)
      .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))
  }

  /// Declaration position of a node, used for stable ordering.
  pub fn position(&self, node_id: &str) -> Option<usize> {
    self.index.get(node_id).copied()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Merged parameters for a node: global config overlaid with the node's own.
  pub fn merged_params(&self, node_id: &str) -> Result<Params, WorkflowError> {
    Ok(self.node(node_id)?.merged_params(&self.global_config))
  }
}
