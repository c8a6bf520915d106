//! Execution strategies.
//!
//! A strategy decides how eligible nodes are scheduled; what happens to a
//! single node is always [`Run::step`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::executor::Run;
use crate::result::{NodeReport, NodeStatus};
use crate::traversal::Traversal;

/// Schedules the nodes of one run.
///
/// Implementations stop when the traversal has nothing left or the run is
/// cancelled; nodes left unresolved are reported as cancelled by the caller.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
  fn name(&self) -> &'static str;

  async fn drive(&self, run: Arc<Run>, traversal: &mut Traversal) -> Vec<NodeReport>;
}

/// One node at a time, in breadth-first edge order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

#[async_trait]
impl ExecutionStrategy for Sequential {
  fn name(&self) -> &'static str {
    "sequential"
  }

  async fn drive(&self, run: Arc<Run>, traversal: &mut Traversal) -> Vec<NodeReport> {
    let mut reports = Vec::new();

    while let Some(eligible) = traversal.pop_ready() {
      if run.is_cancelled() {
        warn!(run_id = %run.run_id(), next = %eligible.node_id, "workflow_cancelled");
        break;
      }

      let step = run.step(eligible).await;
      traversal.resolve(run.workflow(), &step.report.node_id, step.report.status, &step.taken);
      reports.push(step.report);
    }

    reports
  }
}

/// Every eligible node runs as its own task, at most `max_concurrency` at
/// once.
///
/// Nodes touching the same device still serialise on the device lock, and
/// measurements of the same type on the backend handle.
#[derive(Debug, Clone, Copy)]
pub struct Parallel {
  pub max_concurrency: usize,
}

impl Parallel {
  pub fn new(max_concurrency: usize) -> Self {
    Self {
      max_concurrency: max_concurrency.max(1),
    }
  }
}

impl Default for Parallel {
  fn default() -> Self {
    Self::new(4)
  }
}

#[async_trait]
impl ExecutionStrategy for Parallel {
  fn name(&self) -> &'static str {
    "parallel"
  }

  async fn drive(&self, run: Arc<Run>, traversal: &mut Traversal) -> Vec<NodeReport> {
    let permits = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
    let mut reports = Vec::new();

    loop {
      if run.is_cancelled() {
        warn!(run_id = %run.run_id(), "workflow_cancelled");
        break;
      }

      let batch = traversal.drain_ready();
      if batch.is_empty() {
        break;
      }

      info!(
        run_id = %run.run_id(),
        ready_nodes = ?batch.iter().map(|e| e.node_id.as_str()).collect::<Vec<_>>(),
        "node_batch_started"
      );

      let node_ids: Vec<String> = batch.iter().map(|e| e.node_id.clone()).collect();
      let handles: Vec<_> = batch
        .into_iter()
        .map(|eligible| {
          let run = run.clone();
          let permits = permits.clone();
          tokio::spawn(async move {
            // never closed
            let _permit = permits.acquire_owned().await.ok();
            run.step(eligible).await
          })
        })
        .collect();

      let results = futures::future::join_all(handles).await;

      for (node_id, result) in node_ids.into_iter().zip(results) {
        let step = match result {
          Ok(step) => step,
          Err(e) => {
            error!(run_id = %run.run_id(), node_id = %node_id, error = %e, "node_task_failed");
            run.abandon(&node_id, NodeStatus::Failed, format!("node task failed: {}", e))
          }
        };
        traversal.resolve(run.workflow(), &step.report.node_id, step.report.status, &step.taken);
        reports.push(step.report);
      }
    }

    reports
  }
}
