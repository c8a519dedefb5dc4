//! Job creation, host fan-out and status aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use opsflow_config::TargetHost;
use opsflow_store::{Job, JobHost, JobStatus, JobStore, JobUpdate, StepOutcome};
use opsflow_workflow::Workflow;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::RuntimeError;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::host::HostExecutor;

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
  pub job_id: i64,
  pub status: JobStatus,
  /// Outcomes keyed by host name, in step order.
  pub per_host_results: BTreeMap<String, Vec<StepOutcome>>,
}

impl JobResult {
  pub fn is_success(&self) -> bool {
    self.status == JobStatus::Success
  }
}

/// Creates a job, runs every host concurrently and finalizes the job once
/// all of them are done.
pub struct JobAggregator {
  hosts: HostExecutor,
  store: Arc<dyn JobStore>,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl JobAggregator {
  pub fn new(
    hosts: HostExecutor,
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    Self {
      hosts,
      store,
      notifier,
    }
  }

  /// Run `workflow` against `hosts`.
  ///
  /// Fails before dispatch if the job cannot be created. If an execution
  /// record cannot be saved the job is still finalized, as failed, and the
  /// first such error is returned.
  #[instrument(
    name = "job_run",
    skip_all,
    fields(workflow_id = %workflow.workflow_id, host_count = hosts.len())
  )]
  pub async fn run(
    &self,
    workflow: &Workflow,
    hosts: Vec<TargetHost>,
    created_by: &str,
    cancel: CancellationToken,
  ) -> Result<JobResult, RuntimeError> {
    let job_id = self.store.next_job_id().await?;
    let target_hosts: Vec<JobHost> = hosts
      .iter()
      .map(|host| JobHost {
        host_name: host.host_name.clone(),
        execution_id: uuid::Uuid::new_v4().to_string(),
      })
      .collect();

    let job = Job {
      id: uuid::Uuid::new_v4().to_string(),
      job_id,
      name: workflow.name.clone(),
      status: JobStatus::Pending,
      created_by: created_by.to_string(),
      workflow_id: workflow.workflow_id.clone(),
      target_hosts: target_hosts.clone(),
      created_at: Utc::now(),
      completed_at: None,
    };
    self.store.create_job(&job).await?;

    info!(job_id, workflow_id = %workflow.workflow_id, host_count = hosts.len(), "job_started");
    self.notifier.notify(ExecutionEvent::JobStarted {
      job_id,
      workflow_id: workflow.workflow_id.clone(),
      host_count: hosts.len(),
    });

    let steps = Arc::new(workflow.steps.clone());
    let mut handles = Vec::with_capacity(hosts.len());
    for (host, entry) in hosts.into_iter().zip(&target_hosts) {
      let executor = self.hosts.clone();
      let steps = steps.clone();
      let execution_id = entry.execution_id.clone();
      let cancel = cancel.clone();

      handles.push(tokio::spawn(async move {
        executor
          .run(job_id, execution_id, &steps, &host, cancel)
          .await
      }));
    }

    // Join barrier: the job stays pending until every host is done.
    let results = futures::future::join_all(handles).await;

    let mut per_host_results = BTreeMap::new();
    let mut any_failed = false;
    let mut first_error: Option<RuntimeError> = None;

    for (result, entry) in results.into_iter().zip(&target_hosts) {
      match result {
        Ok(run) => {
          any_failed |= run.has_failures();
          if let Err(e) = run.persistence {
            any_failed = true;
            first_error.get_or_insert(RuntimeError::Persistence(e));
          }
          per_host_results.insert(run.execution.host_name, run.execution.outcomes);
        }
        Err(e) => {
          error!(job_id, host = %entry.host_name, error = %e, "host_task_failed");
          any_failed = true;
          first_error.get_or_insert(RuntimeError::HostTask {
            host_name: entry.host_name.clone(),
            message: e.to_string(),
          });
          per_host_results.insert(entry.host_name.clone(), Vec::new());
        }
      }
    }

    let status = if any_failed {
      JobStatus::Failed
    } else {
      JobStatus::Success
    };

    let update = JobUpdate {
      status,
      target_hosts,
      completed_at: Utc::now(),
    };
    self.store.update_job(job_id, &update).await?;

    info!(job_id, status = ?status, "job_completed");
    self.notifier.notify(ExecutionEvent::JobCompleted { job_id, status });

    if let Some(e) = first_error {
      error!(job_id, error = %e, "job_failed");
      return Err(e);
    }

    Ok(JobResult {
      job_id,
      status,
      per_host_results,
    })
  }
}
