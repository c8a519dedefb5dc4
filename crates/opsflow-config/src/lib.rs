//! Opsflow Config
//!
//! This crate contains the serializable workflow definition types for opsflow.
//! These types represent workflows as they are authored and stored, before
//! they are compiled into typed steps by `opsflow-workflow`.
//!
//! Definitions can be loaded from:
//! - JSON files (via `opsflow workflow import`)
//! - Database storage (as JSON blobs)
//!
//! Nothing here is validated. Node types are kept as the raw tag string and
//! node parameters as raw JSON so that a stored workflow always round-trips,
//! even when it would not compile.

mod host;
mod node;
mod workflow;

pub use host::TargetHost;
pub use node::NodeDef;
pub use workflow::{OrderEntry, WorkflowDef};
