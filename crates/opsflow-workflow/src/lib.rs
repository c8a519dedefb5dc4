//! Opsflow Workflow
//!
//! This crate provides the compiled workflow representation for opsflow.
//! A compiled workflow is a validated form of a stored definition that is
//! ready to be dispatched against target hosts.
//!
//! Key differences from `opsflow-config`:
//! - Structural `start`/`end` markers are removed from the run order
//! - Every referenced node exists and carries the parameters its type needs
//! - Node parameters are typed ([`Step`]) instead of raw JSON

mod error;
mod order;
mod step;
mod workflow;

pub use error::WorkflowError;
pub use order::filter_execution_order;
pub use step::{HttpVerb, Step, StepNode};
pub use workflow::Workflow;
