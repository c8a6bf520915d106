use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::experiment::Experiment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
  #[error("experiment not found: {0}")]
  NotFound(String),
}

/// How long finished experiments stay in the tracker.
///
/// Only terminal experiments are ever evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
  /// Upper bound on tracked experiments; oldest terminal ones go first.
  pub max_entries: Option<usize>,
  /// Terminal experiments completed longer ago than this are dropped.
  pub ttl: Option<Duration>,
}

impl RetentionPolicy {
  pub fn unbounded() -> Self {
    Self {
      max_entries: None,
      ttl: None,
    }
  }
}

impl Default for RetentionPolicy {
  fn default() -> Self {
    Self {
      max_entries: Some(1000),
      ttl: None,
    }
  }
}

#[derive(Default)]
struct Entries {
  by_id: HashMap<String, Experiment>,
  /// Insertion order of ids.
  order: Vec<String>,
}

/// Registry of experiments keyed by id.
///
/// Readers never wait on each other; the dispatcher's writes take the lock
/// briefly and never across an await point.
pub struct StatusTracker {
  entries: RwLock<Entries>,
  retention: RetentionPolicy,
}

impl StatusTracker {
  pub fn new(retention: RetentionPolicy) -> Self {
    Self {
      entries: RwLock::new(Entries::default()),
      retention,
    }
  }

  pub fn retention(&self) -> RetentionPolicy {
    self.retention
  }

  /// Insert or replace an experiment, then apply retention.
  pub fn put(&self, experiment: Experiment) {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    if !entries.by_id.contains_key(&experiment.id) {
      entries.order.push(experiment.id.clone());
    }
    entries.by_id.insert(experiment.id.clone(), experiment);
    self.evict(&mut entries);
  }

  pub fn get(&self, id: &str) -> Result<Experiment, TrackerError> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries
      .by_id
      .get(id)
      .cloned()
      .ok_or_else(|| TrackerError::NotFound(id.to_string()))
  }

  /// All tracked experiments in insertion order.
  pub fn list(&self) -> Vec<Experiment> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries
      .order
      .iter()
      .filter_map(|id| entries.by_id.get(id).cloned())
      .collect()
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .order
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn evict(&self, entries: &mut Entries) {
    let mut expired: Vec<String> = Vec::new();

    if let Some(ttl) = self.retention.ttl {
      let now = Utc::now();
      for id in &entries.order {
        let Some(exp) = entries.by_id.get(id) else {
          continue;
        };
        let age = exp
          .completed_at
          .and_then(|at| (now - at).to_std().ok())
          .unwrap_or_default();
        if exp.is_terminal() && age > ttl {
          expired.push(id.clone());
        }
      }
    }

    if let Some(max) = self.retention.max_entries {
      let mut excess = entries.order.len().saturating_sub(expired.len()).saturating_sub(max);
      for id in &entries.order {
        if excess == 0 {
          break;
        }
        if expired.contains(id) {
          continue;
        }
        if entries.by_id.get(id).is_some_and(|e| e.is_terminal()) {
          expired.push(id.clone());
          excess -= 1;
        }
      }
    }

    if expired.is_empty() {
      return;
    }
    for id in &expired {
      entries.by_id.remove(id);
    }
    entries.order.retain(|id| entries.by_id.contains_key(id));
    debug!(evicted = expired.len(), remaining = entries.order.len(), "experiments_evicted");
  }
}

impl Default for StatusTracker {
  fn default() -> Self {
    Self::new(RetentionPolicy::default())
  }
}
