//! Per-host sequential execution.

use std::sync::Arc;

use chrono::Utc;
use opsflow_config::TargetHost;
use opsflow_store::{Execution, JobStore, StepOutcome};
use opsflow_workflow::StepNode;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::dispatcher::{NodeDispatcher, STEP_CANCELLED};
use crate::events::{ExecutionEvent, ExecutionNotifier};

/// What one host produced, plus whether its Execution record was saved.
#[derive(Debug)]
pub struct HostRun {
  pub execution: Execution,
  pub persistence: Result<(), opsflow_store::Error>,
}

impl HostRun {
  pub fn has_failures(&self) -> bool {
    self.execution.outcomes.iter().any(|o| o.failed)
  }
}

/// Runs a workflow's steps against one host, strictly in order.
#[derive(Clone)]
pub struct HostExecutor {
  dispatcher: Arc<NodeDispatcher>,
  store: Arc<dyn JobStore>,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl HostExecutor {
  pub fn new(
    dispatcher: Arc<NodeDispatcher>,
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    Self {
      dispatcher,
      store,
      notifier,
    }
  }

  /// Run `steps` against `host` and persist one Execution record.
  ///
  /// Step failures are recorded, not returned. A failure to persist the
  /// record is reported in [`HostRun::persistence`] so the caller can still
  /// finalize the job.
  #[instrument(
    name = "host_run",
    skip_all,
    fields(job_id = job_id, host = %host.host_name, execution_id = %execution_id)
  )]
  pub async fn run(
    &self,
    job_id: i64,
    execution_id: String,
    steps: &[StepNode],
    host: &TargetHost,
    cancel: CancellationToken,
  ) -> HostRun {
    let started_at = Utc::now();
    info!(step_count = steps.len(), "host_started");
    self.notifier.notify(ExecutionEvent::HostStarted {
      job_id,
      host_name: host.host_name.clone(),
      execution_id: execution_id.clone(),
    });

    let outcomes = self.run_steps(job_id, steps, host, &cancel).await;
    let failed_steps = outcomes.iter().filter(|o| o.failed).count();

    let execution = Execution {
      execution_id: execution_id.clone(),
      job_id,
      host_name: host.host_name.clone(),
      outcomes,
      started_at,
      completed_at: Utc::now(),
    };

    let persistence = self.store.create_execution(&execution).await;
    if let Err(e) = &persistence {
      error!(error = %e, "execution_persist_failed");
    }

    info!(failed_steps, "host_completed");
    self.notifier.notify(ExecutionEvent::HostCompleted {
      job_id,
      host_name: host.host_name.clone(),
      execution_id,
      failed_steps,
    });

    HostRun {
      execution,
      persistence,
    }
  }

  async fn run_steps(
    &self,
    job_id: i64,
    steps: &[StepNode],
    host: &TargetHost,
    cancel: &CancellationToken,
  ) -> Vec<StepOutcome> {
    let config = self.dispatcher.config();
    let deadline = config.host_timeout.map(|limit| (Instant::now() + limit, limit));
    let mut outcomes = Vec::new();

    for node in steps {
      if cancel.is_cancelled() {
        warn!(node_id = %node.node_id, "host cancelled before step");
        outcomes.push(self.record(job_id, failed(node, host, STEP_CANCELLED.to_string())));
        break;
      }

      let dispatched = match deadline {
        Some((at, limit)) => {
          match tokio::time::timeout_at(at, self.dispatcher.dispatch(node, host, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => {
              warn!(node_id = %node.node_id, "host timed out");
              let output = format!("host timed out after {:?}", limit);
              outcomes.push(self.record(job_id, failed(node, host, output)));
              break;
            }
          }
        }
        None => self.dispatcher.dispatch(node, host, cancel).await,
      };

      // Delays produce no outcome unless the run was cancelled mid-wait.
      let Some(outcome) = dispatched else {
        if cancel.is_cancelled() {
          outcomes.push(self.record(job_id, failed(node, host, STEP_CANCELLED.to_string())));
          break;
        }
        continue;
      };

      let stop = outcome.failed && (!config.continue_on_step_failure || cancel.is_cancelled());
      outcomes.push(self.record(job_id, outcome));
      if stop {
        break;
      }
    }

    outcomes
  }

  fn record(&self, job_id: i64, outcome: StepOutcome) -> StepOutcome {
    info!(
      node_id = %outcome.node_id,
      failed = outcome.failed,
      "step_completed"
    );
    self.notifier.notify(ExecutionEvent::StepCompleted {
      job_id,
      outcome: outcome.clone(),
    });
    outcome
  }
}

fn failed(node: &StepNode, host: &TargetHost, output: String) -> StepOutcome {
  StepOutcome {
    node_id: node.node_id.clone(),
    host_name: host.host_name.clone(),
    output,
    failed: true,
  }
}
