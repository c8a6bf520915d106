use std::collections::{HashMap, HashSet};

use electroflow_config::{ConditionDef, EdgeDef};

/// An outgoing edge as seen from its source node.
#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
  pub target: String,
  pub condition: Option<ConditionDef>,
}

/// Graph structure for traversal and analysis.
///
/// Node order is declaration order everywhere it is observable, so two loads
/// of the same file always traverse identically.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: node_id -> outgoing edges in declaration order.
  adjacency: HashMap<String, Vec<Successor>>,
  /// Reverse adjacency: node_id -> list of upstream node_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges, in declaration order.
  entry_points: Vec<String>,
  /// Nodes with multiple incoming edges (join points).
  join_points: HashSet<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
  White,
  Grey,
  Black,
}

impl Graph {
  /// Build a graph from node ids and edges.
  ///
  /// Edges must already reference known nodes.
  pub fn new(node_ids: &[String], edges: &[EdgeDef]) -> Self {
    let mut adjacency: HashMap<String, Vec<Successor>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.clone()).or_default();
      reverse_adjacency.entry(node_id.clone()).or_default();
    }

    for edge in edges {
      adjacency
        .entry(edge.source.clone())
        .or_default()
        .push(Successor {
          target: edge.target.clone(),
          condition: edge.condition.clone(),
        });
      reverse_adjacency
        .entry(edge.target.clone())
        .or_default()
        .push(edge.source.clone());
    }

    let entry_points: Vec<String> = node_ids
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let join_points: HashSet<String> = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      adjacency,
      reverse_adjacency,
      entry_points,
      join_points,
    }
  }

  /// Get entry points (nodes with no incoming edges).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get outgoing edges for a given node, in edge order.
  pub fn successors(&self, node_id: &str) -> &[Successor] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get upstream nodes for a given node, one entry per incoming edge.
  pub fn predecessors(&self, node_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a node is a join point (has multiple incoming edges).
  pub fn is_join_point(&self, node_id: &str) -> bool {
    self.join_points.contains(node_id)
  }

  /// Get all join points.
  pub fn join_points(&self) -> &HashSet<String> {
    &self.join_points
  }

  /// Find a cycle with a white/grey/black depth-first search.
  ///
  /// Returns the nodes on the cycle, starting and ending with the same id.
  pub fn find_cycle(&self, node_ids: &[String]) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = node_ids.iter().map(|id| (id.as_str(), Mark::White)).collect();
    let mut path: Vec<&str> = Vec::new();

    for start in node_ids {
      if marks.get(start.as_str()) != Some(&Mark::White) {
        continue;
      }
      if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
        return Some(cycle);
      }
    }
    None
  }

  fn visit<'a>(
    &'a self,
    node_id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
  ) -> Option<Vec<String>> {
    marks.insert(node_id, Mark::Grey);
    path.push(node_id);

    for successor in self.successors(node_id) {
      let target = successor.target.as_str();
      match marks.get(target).copied().unwrap_or(Mark::White) {
        Mark::Grey => {
          let start = path.iter().position(|id| *id == target).unwrap_or(0);
          let mut cycle: Vec<String> = path[start..].iter().map(|id| id.to_string()).collect();
          cycle.push(target.to_string());
          return Some(cycle);
        }
        Mark::White => {
          if let Some(cycle) = self.visit(target, marks, path) {
            return Some(cycle);
          }
        }
        Mark::Black => {}
      }
    }

    path.pop();
    marks.insert(node_id, Mark::Black);
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
  }

  fn edge(source: &str, target: &str) -> EdgeDef {
    EdgeDef {
      source: source.to_string(),
      target: target.to_string(),
      condition: None,
    }
  }

  #[test]
  fn test_entry_and_join_points() {
    let nodes = ids(&["a", "b", "c", "d"]);
    let graph = Graph::new(&nodes, &[edge("a", "c"), edge("b", "c"), edge("c", "d")]);

    assert_eq!(graph.entry_points(), &["a".to_string(), "b".to_string()]);
    assert!(graph.is_join_point("c"));
    assert!(!graph.is_join_point("d"));
    assert_eq!(graph.predecessors("c"), &["a".to_string(), "b".to_string()]);
    assert_eq!(graph.successors("c")[0].target, "d");
    assert!(graph.successors("d").is_empty());
  }

  #[test]
  fn test_find_cycle() {
    let nodes = ids(&["a", "b", "c"]);
    let graph = Graph::new(&nodes, &[edge("a", "b"), edge("b", "c"), edge("c", "b")]);

    let cycle = graph.find_cycle(&nodes).unwrap();
    assert_eq!(cycle, ids(&["b", "c", "b"]));
  }

  #[test]
  fn test_diamond_is_not_a_cycle() {
    let nodes = ids(&["a", "b", "c", "d"]);
    let graph = Graph::new(
      &nodes,
      &[edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
    );

    assert!(graph.find_cycle(&nodes).is_none());
  }
}
