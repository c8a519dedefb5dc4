//! In-process store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use opsflow_config::WorkflowDef;

use crate::{
  DEFAULT_JOB_ID_FLOOR, Error, Execution, Job, JobStore, JobUpdate, WorkflowStore,
  matches_filter,
};

#[derive(Default)]
struct Inner {
  workflows: BTreeMap<String, WorkflowDef>,
  jobs: BTreeMap<i64, Job>,
  executions: Vec<Execution>,
}

/// A store that keeps everything in memory.
///
/// Job ids come from an atomic counter, so concurrent runs never observe
/// the same id.
pub struct MemoryStore {
  inner: Mutex<Inner>,
  last_job_id: AtomicI64,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::with_job_id_floor(DEFAULT_JOB_ID_FLOOR)
  }

  /// Create a store whose first job id is `floor + 1`.
  pub fn with_job_id_floor(floor: i64) -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      last_job_id: AtomicI64::new(floor),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
  async fn create_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    let mut inner = self.lock();
    if inner.workflows.contains_key(&workflow.id) {
      return Err(Error::Conflict(format!("workflow {} already exists", workflow.id)));
    }
    inner.workflows.insert(workflow.id.clone(), workflow.clone());
    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowDef, Error> {
    self
      .lock()
      .workflows
      .get(workflow_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }

  async fn list_workflows(
    &self,
    search: Option<&str>,
    state: Option<&str>,
  ) -> Result<Vec<WorkflowDef>, Error> {
    Ok(
      self
        .lock()
        .workflows
        .values()
        .filter(|w| matches_filter(w, search, state))
        .cloned()
        .collect(),
    )
  }

  async fn update_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    let mut inner = self.lock();
    match inner.workflows.get_mut(&workflow.id) {
      Some(existing) => {
        *existing = workflow.clone();
        Ok(())
      }
      None => Err(Error::NotFound(format!("workflow {}", workflow.id))),
    }
  }

  async fn delete_workflow(&self, workflow_id: &str) -> Result<(), Error> {
    self
      .lock()
      .workflows
      .remove(workflow_id)
      .map(|_| ())
      .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }
}

#[async_trait]
impl JobStore for MemoryStore {
  async fn next_job_id(&self) -> Result<i64, Error> {
    Ok(self.last_job_id.fetch_add(1, Ordering::SeqCst) + 1)
  }

  async fn create_job(&self, job: &Job) -> Result<(), Error> {
    let mut inner = self.lock();
    if inner.jobs.contains_key(&job.job_id) {
      return Err(Error::Conflict(format!("job {} already exists", job.job_id)));
    }
    inner.jobs.insert(job.job_id, job.clone());
    Ok(())
  }

  async fn update_job(&self, job_id: i64, update: &JobUpdate) -> Result<(), Error> {
    let mut inner = self.lock();
    let job = inner
      .jobs
      .get_mut(&job_id)
      .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
    if job.status.is_terminal() {
      return Err(Error::Conflict(format!("job {} is already finalized", job_id)));
    }
    job.status = update.status;
    job.target_hosts = update.target_hosts.clone();
    job.completed_at = Some(update.completed_at);
    Ok(())
  }

  async fn get_job(&self, job_id: i64) -> Result<Job, Error> {
    self
      .lock()
      .jobs
      .get(&job_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
  }

  async fn list_jobs(&self, workflow_id: Option<&str>) -> Result<Vec<Job>, Error> {
    Ok(
      self
        .lock()
        .jobs
        .values()
        .rev()
        .filter(|j| workflow_id.is_none_or(|id| j.workflow_id == id))
        .cloned()
        .collect(),
    )
  }

  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    let mut inner = self.lock();
    if !inner.jobs.contains_key(&execution.job_id) {
      return Err(Error::NotFound(format!("job {}", execution.job_id)));
    }
    if inner
      .executions
      .iter()
      .any(|e| e.execution_id == execution.execution_id)
    {
      return Err(Error::Conflict(format!(
        "execution {} already exists",
        execution.execution_id
      )));
    }
    inner.executions.push(execution.clone());
    Ok(())
  }

  async fn list_executions(&self, job_id: i64) -> Result<Vec<Execution>, Error> {
    Ok(
      self
        .lock()
        .executions
        .iter()
        .filter(|e| e.job_id == job_id)
        .cloned()
        .collect(),
    )
  }
}
