//! Opsflow Store
//!
//! This crate provides the storage traits and implementations for workflow
//! definitions, jobs and per-host executions.
//!
//! The [`WorkflowStore`] trait covers workflow definitions:
//! - Creating, updating and deleting definitions
//! - Looking a definition up by id or by name/state filter
//!
//! The [`JobStore`] trait covers run records:
//! - Allocating sequential job ids from an atomic sequence
//! - Creating a pending job and finalizing it exactly once
//! - Recording one execution per host
//!
//! [`MemoryStore`] keeps everything in process; [`SqliteStore`] persists to
//! SQLite through sqlx.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{Execution, Job, JobHost, JobStatus, JobUpdate, StepOutcome};

use async_trait::async_trait;
use opsflow_config::WorkflowDef;

/// Job ids are allocated above this value unless configured otherwise.
pub const DEFAULT_JOB_ID_FLOOR: i64 = 10_000;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The write conflicts with an existing record.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A stored document could not be encoded or decoded.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  /// Create a new workflow definition. Fails with `Conflict` if the id exists.
  async fn create_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error>;

  /// Get a workflow definition by ID.
  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowDef, Error>;

  /// List definitions whose name contains `search` (case-insensitive) and
  /// whose state equals `state`. `None` disables a filter.
  async fn list_workflows(
    &self,
    search: Option<&str>,
    state: Option<&str>,
  ) -> Result<Vec<WorkflowDef>, Error>;

  /// Replace an existing workflow definition.
  async fn update_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error>;

  /// Delete a workflow definition.
  async fn delete_workflow(&self, workflow_id: &str) -> Result<(), Error>;
}

/// Storage trait for jobs and executions.
#[async_trait]
pub trait JobStore: Send + Sync {
  /// Atomically allocate the next job id.
  async fn next_job_id(&self) -> Result<i64, Error>;

  /// Create a new job. Fails with `Conflict` if the job id is taken.
  async fn create_job(&self, job: &Job) -> Result<(), Error>;

  /// Apply the terminal update to a pending job.
  ///
  /// Fails with `Conflict` if the job is already terminal.
  async fn update_job(&self, job_id: i64, update: &JobUpdate) -> Result<(), Error>;

  /// Get a job by its sequential id.
  async fn get_job(&self, job_id: i64) -> Result<Job, Error>;

  /// List jobs, newest first, optionally for a single workflow.
  async fn list_jobs(&self, workflow_id: Option<&str>) -> Result<Vec<Job>, Error>;

  /// Record a finished host execution.
  async fn create_execution(&self, execution: &Execution) -> Result<(), Error>;

  /// List executions for a job.
  async fn list_executions(&self, job_id: i64) -> Result<Vec<Execution>, Error>;
}

/// Case-insensitive name filter shared by the implementations.
pub(crate) fn matches_filter(workflow: &WorkflowDef, search: Option<&str>, state: Option<&str>) -> bool {
  let name_ok = search.is_none_or(|s| {
    workflow
      .name
      .to_lowercase()
      .contains(&s.to_lowercase())
  });
  let state_ok = state.is_none_or(|s| workflow.state.as_deref() == Some(s));
  name_ok && state_ok
}
