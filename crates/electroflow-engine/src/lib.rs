//! Electroflow Workflow Engine
//!
//! This crate turns a loaded [`WorkflowDefinition`](electroflow_workflow::WorkflowDefinition)
//! into device commands and tracked experiments.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowRunner                         │
//! │  - owns mpsc channel of submitted workflows                 │
//! │  - submit(workflow) → run_id, start(cancel) runs the loop   │
//! │  - confirm / cancel_run / get_status                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowExecutor                         │
//! │  - run(workflow, cancel) → RunResult                        │
//! │  - traversal + ExecutionStrategy (sequential / parallel)    │
//! │  - device actions under per-device locks                    │
//! │  - conditions, confirmation gate                            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Dispatcher                            │
//! │  - validate → Experiment → backend handle → measurement     │
//! │  - retries, timeout, status tracker, result store           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use electroflow_engine::{Dispatcher, WorkflowExecutor};
//! use tokio_util::sync::CancellationToken;
//!
//! let dispatcher = Dispatcher::new(registry, tracker, results);
//! let executor = WorkflowExecutor::new(Arc::new(dispatcher), devices);
//!
//! let result = executor.run(&workflow, CancellationToken::new()).await;
//! println!("{:?}", result.status);
//! ```

mod condition;
mod dispatcher;
mod error;
mod events;
mod executor;
mod gate;
mod result;
mod retry;
mod runner;
mod strategy;
mod traversal;

pub use condition::{compare, evaluate, lookup};
pub use dispatcher::{DispatchRequest, Dispatcher, DispatcherConfig};
pub use error::{DispatchError, RunnerError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecutorConfig, Run, Step, WorkflowExecutor};
pub use gate::{ConfirmationGate, Decision, GateError, PendingConfirmation};
pub use result::{NodeReport, NodeStatus, RunResult, RunStatus};
pub use retry::RetryPolicy;
pub use runner::{RunPhase, RunState, WorkflowRunner};
pub use strategy::{ExecutionStrategy, Parallel, Sequential};
pub use traversal::{Eligibility, Eligible, Traversal};
