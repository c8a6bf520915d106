//! Electroflow Workflow
//!
//! This crate provides the validated workflow representation for electroflow.
//! A `WorkflowDefinition` is built from the raw JSON types in
//! `electroflow-config` and is immutable once loaded.
//!
//! Key differences from `electroflow-config`:
//! - Node ids are unique and every edge endpoint exists
//! - The graph is acyclic and has at least one entry point
//! - Retry delays and timeouts are resolved into `Duration`s
//! - Entry points and join points are identified
//!
//! Loading never touches a device, so a structurally broken workflow fails
//! before anything physical happens.

mod error;
mod graph;
mod node;
mod workflow;

pub use error::WorkflowError;
pub use graph::{Graph, Successor};
pub use node::Node;
pub use workflow::WorkflowDefinition;
