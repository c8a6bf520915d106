use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl ExperimentStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, ExperimentStatus::Completed | ExperimentStatus::Failed)
  }

  fn can_become(self, next: ExperimentStatus) -> bool {
    use ExperimentStatus::*;
    matches!(
      (self, next),
      (Pending, Running) | (Running, Running) | (Running, Completed) | (Running, Failed)
    )
  }
}

impl fmt::Display for ExperimentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ExperimentStatus::Pending => "pending",
      ExperimentStatus::Running => "running",
      ExperimentStatus::Completed => "completed",
      ExperimentStatus::Failed => "failed",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("experiment {experiment_id}: invalid transition {from} -> {to}")]
pub struct TransitionError {
  pub experiment_id: String,
  pub from: ExperimentStatus,
  pub to: ExperimentStatus,
}

/// One entry in an experiment's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
  pub status: ExperimentStatus,
  pub attempt: u32,
  pub at: DateTime<Utc>,
}

/// One dispatched, tracked unit of measurement work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub uo_type: String,
  /// Validated, unit-normalised parameter snapshot.
  pub parameters: serde_json::Map<String, serde_json::Value>,
  pub status: ExperimentStatus,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub attempt_count: u32,
  pub result: Option<serde_json::Value>,
  pub error: Option<String>,
  pub history: Vec<StatusChange>,
}

impl Experiment {
  /// Create a pending experiment with a fresh UUID.
  pub fn new(
    uo_type: impl Into<String>,
    parameters: serde_json::Map<String, serde_json::Value>,
    node_id: Option<String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      node_id,
      uo_type: uo_type.into(),
      parameters,
      status: ExperimentStatus::Pending,
      created_at: now,
      completed_at: None,
      attempt_count: 0,
      result: None,
      error: None,
      history: vec![StatusChange {
        status: ExperimentStatus::Pending,
        attempt: 0,
        at: now,
      }],
    }
  }

  /// Enter `running` for the next attempt.
  ///
  /// The first call moves a pending experiment to attempt 1; later calls
  /// re-enter `running` with the attempt count incremented.
  pub fn start_attempt(&mut self) -> Result<u32, TransitionError> {
    self.transition(ExperimentStatus::Running)?;
    Ok(self.attempt_count)
  }

  pub fn complete(&mut self, result: serde_json::Value) -> Result<(), TransitionError> {
    self.transition(ExperimentStatus::Completed)?;
    self.result = Some(result);
    self.error = None;
    Ok(())
  }

  pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
    self.transition(ExperimentStatus::Failed)?;
    self.error = Some(error.into());
    Ok(())
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Apply a status change, enforcing the state machine.
  pub fn transition(&mut self, to: ExperimentStatus) -> Result<(), TransitionError> {
    if !self.status.can_become(to) {
      return Err(TransitionError {
        experiment_id: self.id.clone(),
        from: self.status,
        to,
      });
    }

    let now = Utc::now();
    if to == ExperimentStatus::Running {
      self.attempt_count += 1;
    }
    if to.is_terminal() {
      self.completed_at = Some(now);
    }
    self.status = to;
    self.history.push(StatusChange {
      status: to,
      attempt: self.attempt_count,
      at: now,
    });
    Ok(())
  }

  /// Statuses in the order they were entered.
  pub fn status_sequence(&self) -> Vec<ExperimentStatus> {
    self.history.iter().map(|c| c.status).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn experiment() -> Experiment {
    Experiment::new("OCV", serde_json::Map::new(), Some("ocv".to_string()))
  }

  #[test]
  fn test_happy_path() {
    let mut exp = experiment();
    assert_eq!(exp.start_attempt().unwrap(), 1);
    exp.complete(json!({ "final_voltage": 0.9 })).unwrap();

    assert_eq!(
      exp.status_sequence(),
      vec![
        ExperimentStatus::Pending,
        ExperimentStatus::Running,
        ExperimentStatus::Completed
      ]
    );
    assert!(exp.completed_at.is_some());
    assert!(exp.is_terminal());
  }

  #[test]
  fn test_retry_increments_attempt() {
    let mut exp = experiment();
    exp.start_attempt().unwrap();
    assert_eq!(exp.start_attempt().unwrap(), 2);
    assert_eq!(exp.start_attempt().unwrap(), 3);
    exp.fail("timed out").unwrap();

    assert_eq!(exp.attempt_count, 3);
    assert_eq!(exp.history.last().unwrap().attempt, 3);
    assert_eq!(exp.error.as_deref(), Some("timed out"));
  }

  #[test]
  fn test_invalid_transitions() {
    let mut exp = experiment();
    let err = exp.complete(json!({})).unwrap_err();
    assert_eq!(err.from, ExperimentStatus::Pending);
    assert_eq!(err.to, ExperimentStatus::Completed);

    exp.start_attempt().unwrap();
    exp.fail("boom").unwrap();
    assert!(exp.start_attempt().is_err());
    assert!(exp.transition(ExperimentStatus::Pending).is_err());
    assert_eq!(exp.status, ExperimentStatus::Failed);
    assert_eq!(exp.history.len(), 3);
  }

  #[test]
  fn test_serializes_snake_case() {
    let exp = experiment();
    let value = serde_json::to_value(&exp).unwrap();
    assert_eq!(value["status"], json!("pending"));
    assert_eq!(value["node_id"], json!("ocv"));
  }
}
