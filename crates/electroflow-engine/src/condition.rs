//! Edge and node condition evaluation.
//!
//! A condition inspects the result of an experiment that completed earlier in
//! the same run. The referenced node does not have to be a direct
//! predecessor.

use std::cmp::Ordering;
use std::collections::HashMap;

use electroflow_config::{ConditionDef, Operator};
use electroflow_store::{Experiment, ExperimentStatus};
use serde_json::Value;
use tracing::warn;

/// Follow a dotted path (`summary.peak_current`, `data.voltage.0`) into a value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(value, |current, segment| match current {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

/// Apply an operator. Numbers compare numerically; ordering operators on
/// anything else are false.
pub fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
  let ordering = match (actual.as_f64(), expected.as_f64()) {
    (Some(a), Some(b)) => a.partial_cmp(&b),
    _ => None,
  };

  match operator {
    Operator::Eq => ordering.map_or(actual == expected, |o| o == Ordering::Equal),
    Operator::Ne => ordering.map_or(actual != expected, |o| o != Ordering::Equal),
    Operator::Gt => ordering == Some(Ordering::Greater),
    Operator::Lt => ordering == Some(Ordering::Less),
    Operator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    Operator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
  }
}

/// Evaluate a condition against the experiments of the current run, keyed by
/// node id.
///
/// `default_source` is used when the condition names no experiment (edge
/// conditions default to the edge's source). The parameter is looked up in
/// the result first and then under its `summary` section. A missing or
/// unfinished experiment, or a missing parameter, makes the condition false.
pub fn evaluate(
  condition: &ConditionDef,
  default_source: Option<&str>,
  experiments: &HashMap<String, Experiment>,
) -> bool {
  let Some(source) = condition.experiment_id.as_deref().or(default_source) else {
    warn!(parameter = %condition.parameter, "condition_without_source");
    return false;
  };

  let result = experiments
    .get(source)
    .filter(|e| e.status == ExperimentStatus::Completed)
    .and_then(|e| e.result.as_ref());
  let Some(result) = result else {
    warn!(source = %source, "condition_source_not_completed");
    return false;
  };

  let actual = lookup(result, &condition.parameter)
    .or_else(|| result.get("summary").and_then(|s| lookup(s, &condition.parameter)));
  let Some(actual) = actual else {
    warn!(
      source = %source,
      parameter = %condition.parameter,
      "condition_parameter_missing"
    );
    return false;
  };

  compare(actual, condition.operator, &condition.value)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn completed(result: Value) -> Experiment {
    let mut exp = Experiment::new("OCV", serde_json::Map::new(), Some("ocv".to_string()));
    exp.start_attempt().unwrap();
    exp.complete(result).unwrap();
    exp
  }

  fn condition(value: Value) -> ConditionDef {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_lookup_paths() {
    let value = json!({ "summary": { "peak": 2.5 }, "data": { "v": [1, 2, 3] } });
    assert_eq!(lookup(&value, "summary.peak"), Some(&json!(2.5)));
    assert_eq!(lookup(&value, "data.v.1"), Some(&json!(2)));
    assert_eq!(lookup(&value, "data.missing"), None);
  }

  #[test]
  fn test_compare_operators() {
    assert!(compare(&json!(1), Operator::Eq, &json!(1.0)));
    assert!(compare(&json!("ok"), Operator::Eq, &json!("ok")));
    assert!(compare(&json!("ok"), Operator::Ne, &json!("bad")));
    assert!(compare(&json!(0.9), Operator::Ge, &json!(0.8)));
    assert!(!compare(&json!(0.7), Operator::Gt, &json!(0.8)));
    assert!(compare(&json!(0.8), Operator::Le, &json!(0.8)));
    assert!(!compare(&json!("high"), Operator::Gt, &json!(1)));
  }

  #[test]
  fn test_evaluate_with_summary_fallback() {
    let experiments = HashMap::from([(
      "ocv".to_string(),
      completed(json!({ "summary": { "final_voltage": 0.9 } })),
    )]);

    let edge = condition(json!({ "parameter": "final_voltage", "operator": ">=", "value": 0.8 }));
    assert!(evaluate(&edge, Some("ocv"), &experiments));

    let explicit = condition(json!({
      "experiment_id": "ocv",
      "parameter": "summary.final_voltage",
      "operator": "<",
      "value": 0.8
    }));
    assert!(!evaluate(&explicit, None, &experiments));
  }

  #[test]
  fn test_unfinished_source_is_false() {
    let experiments = HashMap::new();
    let c = condition(json!({ "experiment_id": "later", "parameter": "x", "operator": "==", "value": 1 }));
    assert!(!evaluate(&c, None, &experiments));
  }
}
