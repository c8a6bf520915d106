//! Graph traversal bookkeeping shared by every execution strategy.
//!
//! A node becomes eligible once every incoming edge is resolved. At that
//! point it is blocked if any predecessor failed or was blocked, runs if at
//! least one incoming edge was taken, and is skipped otherwise. Entry nodes
//! always run. Eligible nodes come out in the order they became eligible,
//! which gives breadth-first edge order.

use std::collections::{HashMap, HashSet, VecDeque};

use electroflow_workflow::WorkflowDefinition;

use crate::result::NodeStatus;

/// What to do with a node that just became eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
  Run,
  Skip,
  Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligible {
  pub node_id: String,
  pub decision: Eligibility,
}

#[derive(Debug)]
pub struct Traversal {
  in_degree: HashMap<String, usize>,
  /// Unresolved incoming edges per node.
  remaining: HashMap<String, usize>,
  /// Incoming edges that were taken, per node.
  taken: HashMap<String, usize>,
  /// Nodes with a failed or blocked predecessor.
  tainted: HashSet<String>,
  ready: VecDeque<String>,
  resolved: HashMap<String, NodeStatus>,
  /// Node ids in declaration order.
  all: Vec<String>,
}

impl Traversal {
  pub fn new(workflow: &WorkflowDefinition) -> Self {
    let graph = workflow.graph();
    let all: Vec<String> = workflow.nodes().iter().map(|n| n.id.clone()).collect();
    let in_degree: HashMap<String, usize> = all
      .iter()
      .map(|id| (id.clone(), graph.predecessors(id).len()))
      .collect();

    Self {
      remaining: in_degree.clone(),
      in_degree,
      taken: HashMap::new(),
      tainted: HashSet::new(),
      ready: graph.entry_points().iter().cloned().collect(),
      resolved: HashMap::new(),
      all,
    }
  }

  fn decide(&self, node_id: &str) -> Eligibility {
    if self.tainted.contains(node_id) {
      Eligibility::Block
    } else if self.in_degree.get(node_id).copied().unwrap_or(0) == 0
      || self.taken.get(node_id).copied().unwrap_or(0) > 0
    {
      Eligibility::Run
    } else {
      Eligibility::Skip
    }
  }

  /// The next eligible node, if any.
  pub fn pop_ready(&mut self) -> Option<Eligible> {
    let node_id = self.ready.pop_front()?;
    let decision = self.decide(&node_id);
    Some(Eligible { node_id, decision })
  }

  /// Every currently eligible node.
  pub fn drain_ready(&mut self) -> Vec<Eligible> {
    let mut batch = Vec::with_capacity(self.ready.len());
    while let Some(eligible) = self.pop_ready() {
      batch.push(eligible);
    }
    batch
  }

  /// Record a node's final status and which of its outgoing edges were
  /// taken (one flag per successor, in edge order).
  pub fn resolve(
    &mut self,
    workflow: &WorkflowDefinition,
    node_id: &str,
    status: NodeStatus,
    taken_edges: &[bool],
  ) {
    self.resolved.insert(node_id.to_string(), status);

    for (i, successor) in workflow.graph().successors(node_id).iter().enumerate() {
      let target = successor.target.as_str();
      if status.blocks_downstream() {
        self.tainted.insert(target.to_string());
      } else if status == NodeStatus::Completed && taken_edges.get(i).copied().unwrap_or(false) {
        *self.taken.entry(target.to_string()).or_default() += 1;
      }

      if let Some(remaining) = self.remaining.get_mut(target) {
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
          self.ready.push_back(target.to_string());
        }
      }
    }
  }

  pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.resolved.get(node_id).copied()
  }

  pub fn is_finished(&self) -> bool {
    self.resolved.len() == self.all.len()
  }

  /// Nodes not yet resolved, in declaration order.
  pub fn unresolved(&self) -> Vec<String> {
    self
      .all
      .iter()
      .filter(|id| !self.resolved.contains_key(*id))
      .cloned()
      .collect()
  }
}
