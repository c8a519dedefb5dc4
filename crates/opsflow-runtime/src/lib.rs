//! Workflow dispatch for opsflow.
//!
//! This crate runs a compiled workflow against a set of target hosts and
//! records the run as a Job with one Execution per host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RunController                         │
//! │  - execute_workflow(request, cancel) → JobResult            │
//! │  - resolves + compiles the workflow, validates hosts        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       JobAggregator                         │
//! │  - allocates the job id, persists the pending Job           │
//! │  - one spawned HostExecutor per host, joins all of them     │
//! │  - derives and persists the terminal status                 │
//! └─────────────────────────────────────────────────────────────┘
//!                               │  (parallel across hosts)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HostExecutor                          │
//! │  - runs the steps for one host, strictly in order           │
//! │  - persists one Execution when the host finishes            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │  (sequential within a host)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      NodeDispatcher                         │
//! │  - delay / api / script / command → StepOutcome             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = NodeDispatcher::new(http, remote, DispatchConfig::default());
//! let controller = RunController::new(workflow_store, job_store, dispatcher);
//!
//! let request = RunRequest::new("wf-1", hosts, "ops-user");
//! let result = controller.execute_workflow(request, CancellationToken::new()).await?;
//! ```

mod config;
mod controller;
mod dispatcher;
mod error;
mod events;
mod host;
mod job;

pub use config::DispatchConfig;
pub use controller::{RunController, RunRequest};
pub use dispatcher::{FAILED_TO_CONNECT, NodeDispatcher, STEP_CANCELLED};
pub use error::RuntimeError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use host::{HostExecutor, HostRun};
pub use job::{JobAggregator, JobResult};

pub use opsflow_store::{JobStatus, StepOutcome};
