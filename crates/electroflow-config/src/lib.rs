//! Electroflow Config
//!
//! This crate contains the serializable workflow configuration types for
//! electroflow. These types mirror the workflow JSON exactly as it is written
//! by hand or exported from the experiment designer, before any structural
//! validation has happened.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `electroflow run workflow experiment.json`)
//! - Any other source that produces a `serde_json::Value`
//!
//! The `electroflow-workflow` crate takes these types, validates the graph, and
//! turns them into the immutable definition the engine executes.

mod action;
mod condition;
mod edge;
mod node;
mod workflow;

pub use action::{DeviceAction, DeviceFamily, Offset, WashSteps, control_actions};
pub use condition::{ConditionDef, Operator};
pub use edge::EdgeDef;
pub use node::NodeDef;
pub use workflow::{Params, WorkflowDef};
