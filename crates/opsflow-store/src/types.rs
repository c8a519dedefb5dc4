use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  Success,
  Failed,
}

impl JobStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, JobStatus::Pending)
  }
}

/// A host a job ran against, and the execution recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHost {
  pub host_name: String,
  pub execution_id: String,
}

/// One run of a workflow against a set of hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
  pub id: String,
  /// Sequential, human-facing job number.
  pub job_id: i64,
  pub name: String,
  pub status: JobStatus,
  pub created_by: String,
  pub workflow_id: String,
  pub target_hosts: Vec<JobHost>,
  pub created_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

/// The single terminal update applied to a pending job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
  pub status: JobStatus,
  pub target_hosts: Vec<JobHost>,
  pub completed_at: DateTime<Utc>,
}

/// The result of one step on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
  pub node_id: String,
  pub host_name: String,
  pub output: String,
  pub failed: bool,
}

/// The outcome log of one host within one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
  pub execution_id: String,
  pub job_id: i64,
  pub host_name: String,
  pub outcomes: Vec<StepOutcome>,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
}
