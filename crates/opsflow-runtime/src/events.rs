//! Execution events and notifiers for observability.
//!
//! Events are emitted while a job runs so consumers can follow progress,
//! stream it to a terminal, or record it elsewhere.

use opsflow_store::{JobStatus, StepOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  /// The job was created and hosts are about to start.
  JobStarted {
    job_id: i64,
    workflow_id: String,
    host_count: usize,
  },

  /// A host's step sequence has started.
  HostStarted {
    job_id: i64,
    host_name: String,
    execution_id: String,
  },

  /// A step finished on a host (delay steps produce no event).
  StepCompleted { job_id: i64, outcome: StepOutcome },

  /// A host's step sequence has finished.
  HostCompleted {
    job_id: i64,
    host_name: String,
    execution_id: String,
    failed_steps: usize,
  },

  /// All hosts finished and the job reached its terminal status.
  JobCompleted { job_id: i64, status: JobStatus },
}

/// Trait for receiving execution events.
///
/// Called from every host task, so implementations must be cheap and must
/// not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a host's step loop. Volume is
  // a handful of events per step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // A closed receiver only means nobody is watching the run.
    let _ = self.sender.send(event);
  }
}
