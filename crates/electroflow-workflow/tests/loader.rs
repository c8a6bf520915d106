//! Structural validation tests for workflow loading.

use electroflow_workflow::{WorkflowDefinition, WorkflowError};
use serde_json::json;

fn load(value: serde_json::Value) -> Result<WorkflowDefinition, WorkflowError> {
  WorkflowDefinition::load(&value.to_string())
}

fn chain(n: usize) -> serde_json::Value {
  let nodes: Vec<_> = (1..=n)
    .map(|i| json!({ "id": format!("node{}", i), "type": "OCV", "params": { "duration": 1 } }))
    .collect();
  let edges: Vec<_> = (1..n)
    .map(|i| json!({ "source": format!("node{}", i), "target": format!("node{}", i + 1) }))
    .collect();
  json!({ "name": "chain", "nodes": nodes, "edges": edges })
}

#[test]
fn test_load_chain() {
  let workflow = load(chain(4)).unwrap();

  assert_eq!(workflow.nodes().len(), 4);
  assert_eq!(workflow.graph().entry_points(), &["node1".to_string()]);
  assert_eq!(workflow.graph().successors("node2")[0].target, "node3");
  assert_eq!(workflow.position("node4"), Some(3));
}

#[test]
fn test_edge_to_unknown_node() {
  let result = load(json!({
    "name": "broken",
    "nodes": [{ "id": "a", "type": "OCV" }],
    "edges": [{ "source": "a", "target": "ghost" }]
  }));

  match result {
    Err(WorkflowError::InvalidEdge { from, to }) => {
      assert_eq!(from, "a");
      assert_eq!(to, "ghost");
    }
    other => panic!("expected InvalidEdge, got {:?}", other),
  }
}

#[test]
fn test_duplicate_node() {
  let result = load(json!({
    "name": "dup",
    "nodes": [{ "id": "a", "type": "OCV" }, { "id": "a", "type": "CVA" }]
  }));

  assert!(matches!(result, Err(WorkflowError::DuplicateNode(id)) if id == "a"));
}

#[test]
fn test_empty_node_id() {
  let result = load(json!({ "name": "empty", "nodes": [{ "id": " ", "type": "OCV" }] }));
  assert!(matches!(result, Err(WorkflowError::EmptyNodeId(0))));
}

#[test]
fn test_cycle_rejected() {
  let result = load(json!({
    "name": "loop",
    "nodes": [
      { "id": "start", "type": "OCV" },
      { "id": "a", "type": "OCV" },
      { "id": "b", "type": "CVA" }
    ],
    "edges": [
      { "source": "start", "target": "a" },
      { "source": "a", "target": "b" },
      { "source": "b", "target": "a" }
    ]
  }));

  match result {
    Err(WorkflowError::Cycle { path }) => assert_eq!(path, vec!["a", "b", "a"]),
    other => panic!("expected Cycle, got {:?}", other),
  }
}

#[test]
fn test_self_loop_rejected() {
  let result = load(json!({
    "name": "self",
    "nodes": [{ "id": "a", "type": "OCV" }, { "id": "b", "type": "OCV" }],
    "edges": [{ "source": "a", "target": "b" }, { "source": "b", "target": "b" }]
  }));

  assert!(matches!(result, Err(WorkflowError::Cycle { .. })));
}

#[test]
fn test_no_entry_points() {
  let result = load(json!({
    "name": "ring",
    "nodes": [{ "id": "a", "type": "OCV" }, { "id": "b", "type": "OCV" }],
    "edges": [{ "source": "a", "target": "b" }, { "source": "b", "target": "a" }]
  }));

  assert!(matches!(result, Err(WorkflowError::NoEntryPoints)));
}

#[test]
fn test_missing_required_key_is_parse_error() {
  let result = load(json!({ "name": "no nodes" }));
  assert!(matches!(result, Err(WorkflowError::Parse(_))));

  let result = load(json!({ "name": "no type", "nodes": [{ "id": "a" }] }));
  assert!(matches!(result, Err(WorkflowError::Parse(_))));
}

#[test]
fn test_condition_reference_must_exist() {
  let result = load(json!({
    "name": "conditional",
    "nodes": [
      { "id": "a", "type": "OCV" },
      {
        "id": "b",
        "type": "CVA",
        "condition": { "experiment_id": "missing", "parameter": "x", "operator": ">", "value": 1 }
      }
    ],
    "edges": [{ "source": "a", "target": "b" }]
  }));

  match result {
    Err(WorkflowError::UnknownConditionReference { node, reference }) => {
      assert_eq!(node, "b");
      assert_eq!(reference, "missing");
    }
    other => panic!("expected UnknownConditionReference, got {:?}", other),
  }
}

#[test]
fn test_node_condition_needs_reference() {
  let result = load(json!({
    "name": "conditional",
    "nodes": [{
      "id": "a",
      "type": "OCV",
      "condition": { "parameter": "x", "operator": ">", "value": 1 }
    }]
  }));

  assert!(matches!(result, Err(WorkflowError::InvalidNode { .. })));
}

#[test]
fn test_legacy_experiments_with_sequence() {
  let workflow = load(json!({
    "name": "prefect export",
    "global_config": { "instruments": { "pipette": { "type": "p300_single_gen2" } } },
    "experiments": [
      {
        "id": "rinse",
        "uo_type": "OCV",
        "parameters": { "duration": 2 },
        "requires_human_check": true,
        "human_message": "Is the cell filled?"
      },
      { "id": "scan", "uo_type": "CVA", "parameters": { "cycles": 1 } }
    ],
    "sequence": ["rinse", "scan"]
  }))
  .unwrap();

  let rinse = workflow.get_node("rinse").unwrap();
  assert!(rinse.requires_confirmation);
  assert_eq!(rinse.confirmation_message.as_deref(), Some("Is the cell filled?"));
  assert_eq!(workflow.edges().len(), 1);
  assert_eq!(workflow.graph().predecessors("scan"), &["rinse".to_string()]);

  let merged = workflow.merged_params("scan").unwrap();
  assert!(merged.contains_key("instruments"));
  assert_eq!(merged["cycles"], json!(1));
}

#[test]
fn test_sequence_with_unknown_node() {
  let result = load(json!({
    "name": "seq",
    "experiments": [{ "id": "a", "uo_type": "OCV" }],
    "sequence": ["a", "b"]
  }));

  assert!(matches!(result, Err(WorkflowError::InvalidEdge { .. })));
}
