//! Workflow runner with channel-based submission.
//!
//! The `WorkflowRunner` owns an mpsc channel of submitted workflows and
//! executes them one at a time with a [`WorkflowExecutor`]. It is the surface
//! a front end talks to: submit, watch, confirm, cancel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use electroflow_store::{Experiment, RetentionPolicy, TrackerError};
use electroflow_workflow::WorkflowDefinition;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunnerError;
use crate::executor::WorkflowExecutor;
use crate::gate::{Decision, GateError, PendingConfirmation};
use crate::result::RunResult;

/// Where a submitted run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
  Queued,
  Running,
  Finished,
}

/// A submitted run as seen from outside.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
  pub run_id: String,
  pub workflow_name: String,
  pub phase: RunPhase,
  /// Present once the run has finished.
  pub result: Option<RunResult>,
}

#[derive(Default)]
struct Runs {
  by_id: HashMap<String, RunState>,
  /// Finished run ids, oldest first.
  finished: VecDeque<(String, Instant)>,
}

impl Runs {
  fn evict(&mut self, retention: RetentionPolicy) {
    if let Some(ttl) = retention.ttl {
      let now = Instant::now();
      while let Some((run_id, finished_at)) = self.finished.front() {
        if now.duration_since(*finished_at) <= ttl {
          break;
        }
        self.by_id.remove(run_id);
        self.finished.pop_front();
      }
    }
    if let Some(max) = retention.max_entries {
      while self.by_id.len() > max {
        let Some((run_id, _)) = self.finished.pop_front() else {
          break;
        };
        self.by_id.remove(&run_id);
      }
    }
  }
}

struct Submission {
  run_id: String,
  workflow: Arc<WorkflowDefinition>,
}

/// Executes submitted workflows in submission order.
///
/// Finished runs are kept for lookup under a [`RetentionPolicy`]; queued and
/// running ones are never dropped.
///
/// # Usage
///
/// ```ignore
/// let runner = Arc::new(WorkflowRunner::new(executor));
///
/// let cancel = CancellationToken::new();
/// tokio::spawn({
///   let runner = runner.clone();
///   async move { runner.start(cancel).await }
/// });
///
/// let run_id = runner.submit(workflow).await?;
/// ```
pub struct WorkflowRunner {
  sender: mpsc::Sender<Submission>,
  receiver: Mutex<Option<mpsc::Receiver<Submission>>>,
  executor: Arc<WorkflowExecutor>,
  runs: RwLock<Runs>,
  retention: RetentionPolicy,
  tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl WorkflowRunner {
  pub fn new(executor: Arc<WorkflowExecutor>) -> Self {
    Self::with_buffer_size(executor, 100)
  }

  pub fn with_buffer_size(executor: Arc<WorkflowExecutor>, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver: Mutex::new(Some(receiver)),
      executor,
      runs: RwLock::new(Runs::default()),
      retention: RetentionPolicy::default(),
      tokens: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
    self.retention = retention;
    self
  }

  pub fn executor(&self) -> &Arc<WorkflowExecutor> {
    &self.executor
  }

  /// Queue a workflow and return its run id.
  pub async fn submit(&self, workflow: WorkflowDefinition) -> Result<String, RunnerError> {
    let run_id = uuid::Uuid::new_v4().to_string();

    self.write_runs().by_id.insert(
      run_id.clone(),
      RunState {
        run_id: run_id.clone(),
        workflow_name: workflow.name.clone(),
        phase: RunPhase::Queued,
        result: None,
      },
    );
    self.lock_tokens().insert(run_id.clone(), CancellationToken::new());

    let submission = Submission {
      run_id: run_id.clone(),
      workflow: Arc::new(workflow),
    };
    if self.sender.send(submission).await.is_err() {
      self.write_runs().by_id.remove(&run_id);
      self.lock_tokens().remove(&run_id);
      return Err(RunnerError::ChannelClosed);
    }

    info!(run_id = %run_id, "workflow_submitted");
    Ok(run_id)
  }

  /// Start the execution loop.
  ///
  /// Runs until `cancel` fires or every sender is gone. Cancelling also
  /// cancels the run in progress. Only one loop may run per runner.
  pub async fn start(&self, cancel: CancellationToken) -> Result<(), RunnerError> {
    let mut receiver = self
      .receiver
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
      .ok_or(RunnerError::AlreadyStarted)?;

    info!("workflow_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("workflow_runner_cancelled");
          break;
        }
        submission = receiver.recv() => {
          match submission {
            Some(submission) => self.execute(submission, &cancel).await,
            None => {
              info!("workflow_runner_channel_closed");
              break;
            }
          }
        }
      }
    }

    Ok(())
  }

  async fn execute(&self, submission: Submission, cancel: &CancellationToken) {
    let Submission { run_id, workflow } = submission;

    let run_cancel = cancel.child_token();
    let cancelled_while_queued = self
      .lock_tokens()
      .insert(run_id.clone(), run_cancel.clone())
      .is_some_and(|token| token.is_cancelled());
    if cancelled_while_queued {
      run_cancel.cancel();
    }

    if let Some(state) = self.write_runs().by_id.get_mut(&run_id) {
      state.phase = RunPhase::Running;
    }

    let result = self
      .executor
      .execute(run_id.clone(), workflow, run_cancel)
      .await;

    info!(
      run_id = %run_id,
      status = ?result.status,
      nodes = result.nodes.len(),
      "workflow_run_finished"
    );

    self.lock_tokens().remove(&run_id);
    let mut runs = self.write_runs();
    if let Some(state) = runs.by_id.get_mut(&run_id) {
      state.phase = RunPhase::Finished;
      state.result = Some(result);
      runs.finished.push_back((run_id, Instant::now()));
    }
    runs.evict(self.retention);
  }

  /// Cancel a queued or running run. Returns false for unknown or finished
  /// runs.
  pub fn cancel_run(&self, run_id: &str) -> bool {
    match self.lock_tokens().get(run_id) {
      Some(token) => {
        info!(run_id = %run_id, "workflow_run_cancel_requested");
        token.cancel();
        true
      }
      None => false,
    }
  }

  pub fn run(&self, run_id: &str) -> Option<RunState> {
    self
      .runs
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .by_id
      .get(run_id)
      .cloned()
  }

  /// Current record of one experiment.
  pub fn get_status(&self, experiment_id: &str) -> Result<Experiment, TrackerError> {
    self.executor.dispatcher().tracker().get(experiment_id)
  }

  /// All tracked experiments, oldest first.
  pub fn list(&self) -> Vec<Experiment> {
    self.executor.dispatcher().tracker().list()
  }

  pub fn confirm(&self, run_id: &str, node_id: &str, decision: Decision) -> Result<(), GateError> {
    self.executor.gate().confirm(run_id, node_id, decision)
  }

  pub fn pending_confirmations(&self) -> Vec<PendingConfirmation> {
    self.executor.gate().pending()
  }

  /// Disconnect every backend. Safe to call more than once.
  pub async fn shutdown(&self) {
    let active = self.lock_tokens().len();
    if active > 0 {
      warn!(active, "workflow_runner_shutdown_with_active_runs");
    }
    self.executor.dispatcher().registry().shutdown().await;
  }

  fn write_runs(&self) -> std::sync::RwLockWriteGuard<'_, Runs> {
    self.runs.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
