//! Runtime errors.

use opsflow_workflow::WorkflowError;

/// Errors that abort a run.
///
/// Failures of individual steps are never errors; they are recorded as
/// failed step outcomes.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// No workflow exists for the id, or the id is malformed.
  #[error("workflow '{workflow_id}' not found")]
  WorkflowNotFound { workflow_id: String },

  /// The stored workflow cannot be run.
  #[error("malformed workflow: {0}")]
  MalformedWorkflow(#[from] WorkflowError),

  /// The run request itself is invalid.
  #[error("invalid run request: {message}")]
  InvalidRequest { message: String },

  /// Reading or writing a record failed.
  #[error("persistence failure: {0}")]
  Persistence(#[from] opsflow_store::Error),

  /// A host's task ended without producing a result.
  #[error("host '{host_name}' task failed: {message}")]
  HostTask { host_name: String, message: String },
}
