//! Workflow executor.
//!
//! [`WorkflowExecutor::run`] walks a loaded workflow with the configured
//! [`ExecutionStrategy`]. Each node goes through the same steps: condition,
//! parameter merge and validation, device actions, operator confirmation,
//! measurement dispatch, and finally edge conditions for its successors.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use electroflow_config::{DeviceAction, DeviceFamily, Params, control_actions};
use electroflow_device::{DEFAULT_PIPETTE, DeviceSet};
use electroflow_store::{Experiment, ExperimentStatus};
use electroflow_workflow::{Node, WorkflowDefinition};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::condition;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::gate::{self, ConfirmationGate, GateError};
use crate::result::{NodeReport, NodeStatus, RunResult, RunStatus};
use crate::retry::RetryPolicy;
use crate::strategy::{ExecutionStrategy, Sequential};
use crate::traversal::{Eligibility, Eligible, Traversal};

/// Executor settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorConfig {
  /// How long a node waits for an operator; `None` waits indefinitely.
  pub confirmation_timeout: Option<Duration>,
}

/// Runs workflows against one lab station.
pub struct WorkflowExecutor {
  dispatcher: Arc<Dispatcher>,
  devices: DeviceSet,
  gate: Arc<ConfirmationGate>,
  strategy: Arc<dyn ExecutionStrategy>,
  config: ExecutorConfig,
}

impl WorkflowExecutor {
  pub fn new(dispatcher: Arc<Dispatcher>, devices: DeviceSet) -> Self {
    Self {
      dispatcher,
      devices,
      gate: Arc::new(ConfirmationGate::new()),
      strategy: Arc::new(Sequential),
      config: ExecutorConfig::default(),
    }
  }

  pub fn with_strategy(mut self, strategy: impl ExecutionStrategy + 'static) -> Self {
    self.strategy = Arc::new(strategy);
    self
  }

  pub fn with_gate(mut self, gate: Arc<ConfirmationGate>) -> Self {
    self.gate = gate;
    self
  }

  pub fn with_config(mut self, config: ExecutorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn dispatcher(&self) -> &Arc<Dispatcher> {
    &self.dispatcher
  }

  pub fn gate(&self) -> &Arc<ConfirmationGate> {
    &self.gate
  }

  pub fn strategy(&self) -> &dyn ExecutionStrategy {
    self.strategy.as_ref()
  }

  /// Run a workflow to completion under a fresh run id.
  pub async fn run(&self, workflow: &WorkflowDefinition, cancel: CancellationToken) -> RunResult {
    let run_id = uuid::Uuid::new_v4().to_string();
    self
      .execute(run_id, Arc::new(workflow.clone()), cancel)
      .await
  }

  /// Run a workflow under a caller-chosen run id.
  #[instrument(
    name = "workflow_run",
    skip(self, workflow, cancel),
    fields(workflow = %workflow.name, strategy = self.strategy.name())
  )]
  pub async fn execute(
    &self,
    run_id: String,
    workflow: Arc<WorkflowDefinition>,
    cancel: CancellationToken,
  ) -> RunResult {
    let started_at = Utc::now();
    let notifier = self.dispatcher.notifier().clone();

    info!(
      run_id = %run_id,
      nodes = workflow.nodes().len(),
      "workflow_started"
    );
    notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      workflow_name: workflow.name.clone(),
    });

    let run = Arc::new(Run {
      run_id: run_id.clone(),
      workflow: workflow.clone(),
      cancel,
      dispatcher: self.dispatcher.clone(),
      devices: self.devices.clone(),
      gate: self.gate.clone(),
      notifier: notifier.clone(),
      confirmation_timeout: self.config.confirmation_timeout,
      submitted: AtomicUsize::new(0),
      experiments: Mutex::new(HashMap::new()),
    });

    let mut traversal = Traversal::new(&workflow);
    let mut nodes = self.strategy.drive(run.clone(), &mut traversal).await;

    for node_id in traversal.unresolved() {
      let step = run.abandon(&node_id, NodeStatus::Cancelled, "run cancelled");
      nodes.push(step.report);
    }

    let status = if nodes.iter().any(|n| n.status == NodeStatus::Cancelled) {
      RunStatus::Cancelled
    } else if nodes
      .iter()
      .any(|n| matches!(n.status, NodeStatus::Failed | NodeStatus::Blocked))
    {
      RunStatus::CompletedWithErrors
    } else {
      RunStatus::Succeeded
    };

    let result = RunResult {
      run_id: run_id.clone(),
      workflow_name: workflow.name.clone(),
      status,
      started_at,
      completed_at: Utc::now(),
      nodes,
      experiments: run.experiments(),
    };

    info!(
      run_id = %run_id,
      status = ?status,
      experiments = result.experiments.len(),
      "workflow_completed"
    );
    notifier.notify(ExecutionEvent::RunCompleted { run_id, status });

    result
  }
}

/// The outcome of one node, plus which of its outgoing edges were taken.
#[derive(Debug, Clone)]
pub struct Step {
  pub report: NodeReport,
  /// One flag per successor, in edge order.
  pub taken: Vec<bool>,
}

/// Why a node stopped before producing an experiment.
enum Halt {
  Skipped(String),
  Failed(String),
  Cancelled(String),
}

/// State shared by every node of one run.
pub struct Run {
  run_id: String,
  workflow: Arc<WorkflowDefinition>,
  cancel: CancellationToken,
  dispatcher: Arc<Dispatcher>,
  devices: DeviceSet,
  gate: Arc<ConfirmationGate>,
  notifier: Arc<dyn ExecutionNotifier>,
  confirmation_timeout: Option<Duration>,
  /// Submission counter; orders `experiments` independently of completion.
  submitted: AtomicUsize,
  /// Node id to (submission index, experiment).
  experiments: Mutex<HashMap<String, (usize, Experiment)>>,
}

impl Run {
  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn workflow(&self) -> &WorkflowDefinition {
    &self.workflow
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Resolve one eligible node.
  pub async fn step(&self, eligible: Eligible) -> Step {
    let node_id = eligible.node_id.as_str();

    if self.is_cancelled() {
      return self.abandon(node_id, NodeStatus::Cancelled, "run cancelled");
    }

    match eligible.decision {
      Eligibility::Block => self.abandon(node_id, NodeStatus::Blocked, "upstream node failed"),
      Eligibility::Skip => self.abandon(node_id, NodeStatus::Skipped, "no incoming edge taken"),
      Eligibility::Run => match self.workflow.get_node(node_id) {
        Some(node) => self.visit(node).await,
        None => self.abandon(node_id, NodeStatus::Failed, "node not found"),
      },
    }
  }

  /// Resolve a node without running it.
  pub fn abandon(&self, node_id: &str, status: NodeStatus, reason: impl Into<String>) -> Step {
    let reason = reason.into();
    let uo_type = self
      .workflow
      .get_node(node_id)
      .map(|n| n.uo_type.as_str())
      .unwrap_or_default();

    match status {
      NodeStatus::Failed => {
        warn!(run_id = %self.run_id, node_id = %node_id, error = %reason, "node_failed");
        self.notifier.notify(ExecutionEvent::NodeFailed {
          run_id: self.run_id.clone(),
          node_id: node_id.to_string(),
          error: reason.clone(),
        });
      }
      _ => {
        info!(run_id = %self.run_id, node_id = %node_id, status = ?status, reason = %reason, "node_skipped");
        self.notifier.notify(ExecutionEvent::NodeSkipped {
          run_id: self.run_id.clone(),
          node_id: node_id.to_string(),
          reason: reason.clone(),
        });
      }
    }

    let mut report = NodeReport::new(node_id, uo_type, status);
    if status != NodeStatus::Skipped {
      report = report.with_error(reason);
    }
    Step {
      taken: self.untaken(node_id),
      report,
    }
  }

  async fn visit(&self, node: &Node) -> Step {
    let started_at = Some(Utc::now());
    let mut readings = Vec::new();

    let outcome = self.attempt(node, &mut readings).await;

    let (status, error, experiment) = match outcome {
      Ok(experiment) if experiment.status == ExperimentStatus::Completed => {
        (NodeStatus::Completed, None, Some(experiment))
      }
      Ok(experiment) => {
        let error = experiment
          .error
          .clone()
          .unwrap_or_else(|| "experiment failed".to_string());
        (NodeStatus::Failed, Some(error), Some(experiment))
      }
      Err(Halt::Skipped(reason)) => {
        let mut step = self.abandon(&node.id, NodeStatus::Skipped, reason);
        step.report.started_at = started_at;
        step.report.completed_at = Some(Utc::now());
        return step;
      }
      Err(Halt::Failed(error)) => (NodeStatus::Failed, Some(error), None),
      Err(Halt::Cancelled(error)) => (NodeStatus::Cancelled, Some(error), None),
    };

    match (&status, &experiment) {
      (NodeStatus::Completed, Some(experiment)) => {
        info!(
          run_id = %self.run_id,
          node_id = %node.id,
          experiment_id = %experiment.id,
          "node_completed"
        );
        self.notifier.notify(ExecutionEvent::NodeCompleted {
          run_id: self.run_id.clone(),
          node_id: node.id.clone(),
          experiment_id: experiment.id.clone(),
        });
      }
      (NodeStatus::Cancelled, _) => {
        warn!(run_id = %self.run_id, node_id = %node.id, "node_cancelled");
        self.notifier.notify(ExecutionEvent::NodeSkipped {
          run_id: self.run_id.clone(),
          node_id: node.id.clone(),
          reason: error.clone().unwrap_or_default(),
        });
      }
      _ => {
        let error = error.clone().unwrap_or_default();
        warn!(run_id = %self.run_id, node_id = %node.id, error = %error, "node_failed");
        self.notifier.notify(ExecutionEvent::NodeFailed {
          run_id: self.run_id.clone(),
          node_id: node.id.clone(),
          error,
        });
      }
    }

    let taken = if status == NodeStatus::Completed {
      self.taken_edges(node)
    } else {
      self.untaken(&node.id)
    };

    let mut report = NodeReport::new(&node.id, &node.uo_type, status);
    report.error = error;
    report.experiment = experiment;
    report.device_readings = readings;
    report.started_at = started_at;
    report.completed_at = Some(Utc::now());

    Step { report, taken }
  }

  async fn attempt(&self, node: &Node, readings: &mut Vec<Value>) -> Result<Experiment, Halt> {
    if let Some(condition) = &node.condition {
      if !condition::evaluate(condition, None, &self.completed()) {
        return Err(Halt::Skipped(format!(
          "condition {} {} {} not met",
          condition.parameter, condition.operator, condition.value
        )));
      }
    }

    info!(run_id = %self.run_id, node_id = %node.id, uo_type = %node.uo_type, "node_started");
    self.notifier.notify(ExecutionEvent::NodeStarted {
      run_id: self.run_id.clone(),
      node_id: node.id.clone(),
    });

    let params = node.merged_params(&self.workflow.global_config);

    // parameter errors must surface before any device moves
    self
      .dispatcher
      .validate(&node.uo_type, &params)
      .await
      .map_err(|e| Halt::Failed(e.to_string()))?;

    let retry = self.retry_policy(node);
    self.run_device_actions(node, &params, retry, readings).await?;

    if node.requires_confirmation {
      self.await_confirmation(node).await?;
    }

    let mut request = DispatchRequest::new(&node.uo_type, params)
      .for_node(&node.id)
      .with_retry(retry);
    if let Some(timeout) = node.timeout {
      request = request.with_timeout(timeout);
    }

    let index = self.submitted.fetch_add(1, Ordering::SeqCst);
    let experiment = self
      .dispatcher
      .dispatch_request(request)
      .await
      .map_err(|e| Halt::Failed(e.to_string()))?;

    self
      .lock()
      .insert(node.id.clone(), (index, experiment.clone()));
    Ok(experiment)
  }

  async fn run_device_actions(
    &self,
    node: &Node,
    params: &Params,
    retry: RetryPolicy,
    readings: &mut Vec<Value>,
  ) -> Result<(), Halt> {
    // wash steps retry one at a time so finished dispenses are not repeated
    let mut actions = Vec::with_capacity(node.device_actions.len());
    for action in &node.device_actions {
      let DeviceAction::Wash { steps } = action else {
        actions.push(action.clone());
        continue;
      };
      let (expanded, unknown) = steps.actions();
      for key in unknown {
        warn!(run_id = %self.run_id, node_id = %node.id, key = %key, "unknown_wash_step");
      }
      actions.extend(expanded);
    }
    if let Some(control) = node.params.get("arduino_control").and_then(Value::as_object) {
      let (expanded, unknown) = control_actions(control);
      for key in unknown {
        warn!(run_id = %self.run_id, node_id = %node.id, key = %key, "unknown_control_key");
      }
      actions.extend(expanded);
    }
    if actions.is_empty() {
      return Ok(());
    }

    let families: BTreeSet<DeviceFamily> = actions.iter().map(DeviceAction::family).collect();
    let pipette = params
      .get("instruments")
      .and_then(|i| i.pointer("/pipette/type"))
      .and_then(Value::as_str)
      .unwrap_or(DEFAULT_PIPETTE)
      .to_string();

    let mut guard = self.devices.lock(&families).await;

    for action in &actions {
      let mut attempt = 1;
      loop {
        let outcome = guard.execute(action, &pipette).await;
        match outcome {
          Ok(reading) => {
            readings.extend(reading);
            break;
          }
          Err(err) if err.is_retryable() && attempt < retry.max_attempts() => {
            warn!(
              run_id = %self.run_id,
              node_id = %node.id,
              action = action.name(),
              attempt,
              error = %err,
              "device_action_retrying"
            );
            // other nodes may use the devices while this one waits
            drop(guard);
            tokio::time::sleep(retry.retry_delay).await;
            guard = self.devices.lock(&families).await;
            attempt += 1;
          }
          Err(err) if node.best_effort => {
            warn!(
              run_id = %self.run_id,
              node_id = %node.id,
              action = action.name(),
              error = %err,
              "device_action_failed_best_effort"
            );
            break;
          }
          Err(err) => {
            return Err(Halt::Failed(format!(
              "device action {} failed: {}",
              action.name(),
              err
            )));
          }
        }
      }
    }

    Ok(())
  }

  async fn await_confirmation(&self, node: &Node) -> Result<(), Halt> {
    let message = node
      .confirmation_message
      .clone()
      .unwrap_or_else(|| format!("Confirm {} ({})", node.display_name(), node.uo_type));

    self.notifier.notify(ExecutionEvent::ConfirmationRequested {
      run_id: self.run_id.clone(),
      node_id: node.id.clone(),
      message: message.clone(),
    });

    let decision = self
      .gate
      .wait(
        &self.run_id,
        &node.id,
        &message,
        self.confirmation_timeout,
        &self.cancel,
      )
      .await;

    match decision {
      Ok(gate::Decision::Approve) => Ok(()),
      Ok(gate::Decision::Reject) => Err(Halt::Failed("rejected by operator".to_string())),
      Err(GateError::Cancelled) => Err(Halt::Cancelled(GateError::Cancelled.to_string())),
      Err(e) => Err(Halt::Failed(e.to_string())),
    }
  }

  fn retry_policy(&self, node: &Node) -> RetryPolicy {
    self
      .dispatcher
      .config()
      .retry
      .with_overrides(node.retry_count, node.retry_delay)
  }

  fn taken_edges(&self, node: &Node) -> Vec<bool> {
    let completed = self.completed();
    self
      .workflow
      .graph()
      .successors(&node.id)
      .iter()
      .map(|successor| match &successor.condition {
        Some(condition) => {
          let taken = condition::evaluate(condition, Some(node.id.as_str()), &completed);
          if !taken {
            info!(
              run_id = %self.run_id,
              source = %node.id,
              target = %successor.target,
              "edge_condition_false"
            );
          }
          taken
        }
        None => true,
      })
      .collect()
  }

  fn untaken(&self, node_id: &str) -> Vec<bool> {
    vec![false; self.workflow.graph().successors(node_id).len()]
  }

  /// Experiments of this run keyed by node id.
  fn completed(&self) -> HashMap<String, Experiment> {
    self
      .lock()
      .iter()
      .map(|(node_id, (_, experiment))| (node_id.clone(), experiment.clone()))
      .collect()
  }

  /// Experiments of this run in submission order.
  fn experiments(&self) -> Vec<Experiment> {
    let mut indexed: Vec<_> = self.lock().values().cloned().collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, experiment)| experiment).collect()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (usize, Experiment)>> {
    self.experiments.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
