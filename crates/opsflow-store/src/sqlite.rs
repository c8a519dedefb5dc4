use chrono::{DateTime, Utc};
use opsflow_config::WorkflowDef;
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use async_trait::async_trait;

use crate::{
  DEFAULT_JOB_ID_FLOOR, Error, Execution, Job, JobHost, JobStatus, JobStore, JobUpdate,
  StepOutcome, WorkflowStore, matches_filter,
};

/// Name of the job id sequence row.
const JOB_SEQUENCE: &str = "jobs";

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
  job_id_floor: i64,
}

#[derive(FromRow)]
struct WorkflowRow {
  definition: Json<WorkflowDef>,
}

#[derive(FromRow)]
struct JobRow {
  id: String,
  job_id: i64,
  name: String,
  status: JobStatus,
  created_by: String,
  workflow_id: String,
  target_hosts: Json<Vec<JobHost>>,
  created_at: DateTime<Utc>,
  completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
  fn from(row: JobRow) -> Self {
    Job {
      id: row.id,
      job_id: row.job_id,
      name: row.name,
      status: row.status,
      created_by: row.created_by,
      workflow_id: row.workflow_id,
      target_hosts: row.target_hosts.0,
      created_at: row.created_at,
      completed_at: row.completed_at,
    }
  }
}

#[derive(FromRow)]
struct ExecutionRow {
  execution_id: String,
  job_id: i64,
  host_name: String,
  outcomes: Json<Vec<StepOutcome>>,
  started_at: DateTime<Utc>,
  completed_at: DateTime<Utc>,
}

impl From<ExecutionRow> for Execution {
  fn from(row: ExecutionRow) -> Self {
    Execution {
      execution_id: row.execution_id,
      job_id: row.job_id,
      host_name: row.host_name,
      outcomes: row.outcomes.0,
      started_at: row.started_at,
      completed_at: row.completed_at,
    }
  }
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self {
      pool,
      job_id_floor: DEFAULT_JOB_ID_FLOOR,
    }
  }

  /// Set the value job ids are allocated above when the sequence is empty.
  pub fn with_job_id_floor(mut self, floor: i64) -> Self {
    self.job_id_floor = floor;
    self
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(&self.pool).await
  }
}

/// Map unique-constraint violations to `Conflict`.
fn conflict_or(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
  match err.as_database_error() {
    Some(db) if db.is_unique_violation() => Error::Conflict(what()),
    _ => Error::Database(err),
  }
}

#[async_trait]
impl WorkflowStore for SqliteStore {
  async fn create_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    let now = Utc::now();
    sqlx::query(
      r#"
            INSERT INTO workflows (id, name, state, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&workflow.id)
    .bind(&workflow.name)
    .bind(&workflow.state)
    .bind(Json(workflow))
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await
    .map_err(|e| conflict_or(e, || format!("workflow {} already exists", workflow.id)))?;

    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowDef, Error> {
    let row: Option<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT definition
            FROM workflows
            WHERE id = ?
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(|r| r.definition.0)
      .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_id)))
  }

  async fn list_workflows(
    &self,
    search: Option<&str>,
    state: Option<&str>,
  ) -> Result<Vec<WorkflowDef>, Error> {
    let rows: Vec<WorkflowRow> = sqlx::query_as(
      r#"
            SELECT definition
            FROM workflows
            WHERE (?1 IS NULL OR state = ?1)
            ORDER BY name ASC
            "#,
    )
    .bind(state)
    .fetch_all(&self.pool)
    .await?;

    // Name matching is done here so it agrees with MemoryStore on non-ASCII names.
    Ok(
      rows
        .into_iter()
        .map(|r| r.definition.0)
        .filter(|w| matches_filter(w, search, state))
        .collect(),
    )
  }

  async fn update_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE workflows
            SET name = ?, state = ?, definition = ?, updated_at = ?
            WHERE id = ?
            "#,
    )
    .bind(&workflow.name)
    .bind(&workflow.state)
    .bind(Json(workflow))
    .bind(Utc::now())
    .bind(&workflow.id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("workflow {}", workflow.id)));
    }
    Ok(())
  }

  async fn delete_workflow(&self, workflow_id: &str) -> Result<(), Error> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
      .bind(workflow_id)
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!("workflow {}", workflow_id)));
    }
    Ok(())
  }
}

#[async_trait]
impl JobStore for SqliteStore {
  async fn next_job_id(&self) -> Result<i64, Error> {
    // A single upsert statement, so concurrent callers serialize on the row.
    let next: i64 = sqlx::query_scalar(
      r#"
            INSERT INTO job_sequence (name, value)
            VALUES (?, ?)
            ON CONFLICT (name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
    )
    .bind(JOB_SEQUENCE)
    .bind(self.job_id_floor + 1)
    .fetch_one(&self.pool)
    .await?;

    Ok(next)
  }

  async fn create_job(&self, job: &Job) -> Result<(), Error> {
    sqlx::query(
            r#"
            INSERT INTO jobs (id, job_id, name, status, created_by, workflow_id, target_hosts, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.job_id)
        .bind(&job.name)
        .bind(job.status)
        .bind(&job.created_by)
        .bind(&job.workflow_id)
        .bind(Json(&job.target_hosts))
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, || format!("job {} already exists", job.job_id)))?;

    Ok(())
  }

  async fn update_job(&self, job_id: i64, update: &JobUpdate) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE jobs
            SET status = ?, target_hosts = ?, completed_at = ?
            WHERE job_id = ? AND status = ?
            "#,
    )
    .bind(update.status)
    .bind(Json(&update.target_hosts))
    .bind(update.completed_at)
    .bind(job_id)
    .bind(JobStatus::Pending)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      // Distinguish a missing job from one that was already finalized.
      self.get_job(job_id).await?;
      return Err(Error::Conflict(format!("job {} is already finalized", job_id)));
    }
    Ok(())
  }

  async fn get_job(&self, job_id: i64) -> Result<Job, Error> {
    let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, name, status, created_by, workflow_id, target_hosts, created_at, completed_at
            FROM jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

    row
      .map(Job::from)
      .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
  }

  async fn list_jobs(&self, workflow_id: Option<&str>) -> Result<Vec<Job>, Error> {
    let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, name, status, created_by, workflow_id, target_hosts, created_at, completed_at
            FROM jobs
            WHERE (?1 IS NULL OR workflow_id = ?1)
            ORDER BY job_id DESC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

    Ok(rows.into_iter().map(Job::from).collect())
  }

  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO executions (execution_id, job_id, host_name, outcomes, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&execution.execution_id)
    .bind(execution.job_id)
    .bind(&execution.host_name)
    .bind(Json(&execution.outcomes))
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .execute(&self.pool)
    .await
    .map_err(|e| {
      conflict_or(e, || {
        format!("execution {} already exists", execution.execution_id)
      })
    })?;

    Ok(())
  }

  async fn list_executions(&self, job_id: i64) -> Result<Vec<Execution>, Error> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(
      r#"
            SELECT execution_id, job_id, host_name, outcomes, started_at, completed_at
            FROM executions
            WHERE job_id = ?
            ORDER BY started_at ASC, host_name ASC
            "#,
    )
    .bind(job_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(Execution::from).collect())
  }
}
