//! The run entry point.

use std::collections::HashSet;
use std::sync::Arc;

use opsflow_config::TargetHost;
use opsflow_store::{JobStore, WorkflowStore};
use opsflow_workflow::Workflow;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::dispatcher::NodeDispatcher;
use crate::error::RuntimeError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::host::HostExecutor;
use crate::job::{JobAggregator, JobResult};

const MAX_WORKFLOW_ID_LEN: usize = 128;

/// A request to run a stored workflow against a set of hosts.
#[derive(Debug, Clone)]
pub struct RunRequest {
  pub workflow_id: String,
  pub target_hosts: Vec<TargetHost>,
  pub created_by: String,
}

impl RunRequest {
  pub fn new(
    workflow_id: impl Into<String>,
    target_hosts: Vec<TargetHost>,
    created_by: impl Into<String>,
  ) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      target_hosts,
      created_by: created_by.into(),
    }
  }
}

/// Resolves, validates and runs workflows.
pub struct RunController {
  workflows: Arc<dyn WorkflowStore>,
  aggregator: JobAggregator,
}

impl RunController {
  pub fn new(
    workflows: Arc<dyn WorkflowStore>,
    jobs: Arc<dyn JobStore>,
    dispatcher: NodeDispatcher,
  ) -> Self {
    Self::with_notifier(workflows, jobs, dispatcher, Arc::new(NoopNotifier))
  }

  pub fn with_notifier(
    workflows: Arc<dyn WorkflowStore>,
    jobs: Arc<dyn JobStore>,
    dispatcher: NodeDispatcher,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    let hosts = HostExecutor::new(Arc::new(dispatcher), jobs.clone(), notifier.clone());
    Self {
      workflows,
      aggregator: JobAggregator::new(hosts, jobs, notifier),
    }
  }

  /// Run a stored workflow against the requested hosts.
  ///
  /// Nothing is persisted unless the workflow exists, compiles and the
  /// host list is valid.
  #[instrument(
    name = "execute_workflow",
    skip_all,
    fields(workflow_id = %request.workflow_id, created_by = %request.created_by)
  )]
  pub async fn execute_workflow(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<JobResult, RuntimeError> {
    let workflow = self.resolve(&request.workflow_id).await?;
    check_hosts(&request.target_hosts)?;

    info!(
      step_count = workflow.steps.len(),
      host_count = request.target_hosts.len(),
      "workflow_resolved"
    );

    self
      .aggregator
      .run(&workflow, request.target_hosts, &request.created_by, cancel)
      .await
  }

  async fn resolve(&self, workflow_id: &str) -> Result<Workflow, RuntimeError> {
    let not_found = || RuntimeError::WorkflowNotFound {
      workflow_id: workflow_id.to_string(),
    };

    if !is_valid_workflow_id(workflow_id) {
      warn!("malformed workflow id");
      return Err(not_found());
    }

    let def = match self.workflows.get_workflow(workflow_id).await {
      Ok(def) => def,
      Err(opsflow_store::Error::NotFound(_)) => return Err(not_found()),
      Err(e) => return Err(e.into()),
    };

    Ok(Workflow::compile(&def)?)
  }
}

fn is_valid_workflow_id(id: &str) -> bool {
  !id.is_empty()
    && id.len() <= MAX_WORKFLOW_ID_LEN
    && id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn check_hosts(hosts: &[TargetHost]) -> Result<(), RuntimeError> {
  let mut seen = HashSet::new();
  for host in hosts {
    if host.host_name.is_empty() {
      return Err(RuntimeError::InvalidRequest {
        message: "target host with empty hostName".to_string(),
      });
    }
    if !seen.insert(host.host_name.as_str()) {
      return Err(RuntimeError::InvalidRequest {
        message: format!("duplicate target host '{}'", host.host_name),
      });
    }
  }
  Ok(())
}
