//! Behaviour shared by every store implementation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use opsflow_config::{NodeDef, OrderEntry, WorkflowDef};
use opsflow_store::{
  Error, Execution, Job, JobHost, JobStatus, JobStore, JobUpdate, MemoryStore, SqliteStore,
  StepOutcome, WorkflowStore,
};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

async fn sqlite_store() -> SqliteStore {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("failed to open sqlite");
  let store = SqliteStore::new(pool);
  store.migrate().await.expect("failed to migrate");
  store
}

fn workflow(id: &str, name: &str, state: Option<&str>) -> WorkflowDef {
  WorkflowDef {
    id: id.to_string(),
    name: name.to_string(),
    state: state.map(str::to_string),
    nodes: vec![
      NodeDef {
        id: "start".to_string(),
        node_type: "start".to_string(),
        data: serde_json::Value::Null,
      },
      NodeDef {
        id: "cmd".to_string(),
        node_type: "command".to_string(),
        data: json!({ "command": "uptime" }),
      },
    ],
    execution_order: vec![OrderEntry::from("start"), OrderEntry::from("cmd")],
  }
}

fn pending_job(job_id: i64, workflow_id: &str) -> Job {
  Job {
    id: format!("job-{}", job_id),
    job_id,
    name: "Patch".to_string(),
    status: JobStatus::Pending,
    created_by: "tester".to_string(),
    workflow_id: workflow_id.to_string(),
    target_hosts: vec![],
    created_at: Utc::now(),
    completed_at: None,
  }
}

async fn check_workflow_crud<S: WorkflowStore>(store: &S) {
  store
    .create_workflow(&workflow("wf-1", "Patch Oracle", Some("published")))
    .await
    .unwrap();
  store
    .create_workflow(&workflow("wf-2", "Restart nginx", Some("draft")))
    .await
    .unwrap();

  let dup = store
    .create_workflow(&workflow("wf-1", "Again", None))
    .await;
  assert!(matches!(dup, Err(Error::Conflict(_))));

  let fetched = store.get_workflow("wf-1").await.unwrap();
  assert_eq!(fetched, workflow("wf-1", "Patch Oracle", Some("published")));

  let found = store.list_workflows(Some("oracle"), None).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].id, "wf-1");

  let drafts = store.list_workflows(None, Some("draft")).await.unwrap();
  assert_eq!(drafts.len(), 1);
  assert_eq!(drafts[0].id, "wf-2");

  assert_eq!(store.list_workflows(None, None).await.unwrap().len(), 2);

  let mut renamed = workflow("wf-2", "Restart apache", Some("published"));
  renamed.nodes.pop();
  store.update_workflow(&renamed).await.unwrap();
  assert_eq!(store.get_workflow("wf-2").await.unwrap(), renamed);

  assert!(matches!(
    store.update_workflow(&workflow("ghost", "x", None)).await,
    Err(Error::NotFound(_))
  ));

  store.delete_workflow("wf-1").await.unwrap();
  assert!(matches!(
    store.get_workflow("wf-1").await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(
    store.delete_workflow("wf-1").await,
    Err(Error::NotFound(_))
  ));
}

async fn check_job_lifecycle<S: JobStore>(store: &S) {
  let first = store.next_job_id().await.unwrap();
  let second = store.next_job_id().await.unwrap();
  assert_eq!(first, 10_001);
  assert_eq!(second, 10_002);

  store.create_job(&pending_job(first, "wf-1")).await.unwrap();
  assert!(matches!(
    store.create_job(&pending_job(first, "wf-1")).await,
    Err(Error::Conflict(_))
  ));

  let execution = Execution {
    execution_id: "exec-a".to_string(),
    job_id: first,
    host_name: "db01".to_string(),
    outcomes: vec![StepOutcome {
      node_id: "cmd".to_string(),
      host_name: "db01".to_string(),
      output: " 10:00 up 3 days".to_string(),
      failed: false,
    }],
    started_at: Utc::now(),
    completed_at: Utc::now(),
  };
  store.create_execution(&execution).await.unwrap();

  let update = JobUpdate {
    status: JobStatus::Success,
    target_hosts: vec![JobHost {
      host_name: "db01".to_string(),
      execution_id: "exec-a".to_string(),
    }],
    completed_at: Utc::now(),
  };
  store.update_job(first, &update).await.unwrap();

  let job = store.get_job(first).await.unwrap();
  assert_eq!(job.status, JobStatus::Success);
  assert_eq!(job.target_hosts, update.target_hosts);
  assert!(job.completed_at.is_some());

  // A job becomes terminal exactly once.
  assert!(matches!(
    store.update_job(first, &update).await,
    Err(Error::Conflict(_))
  ));
  assert!(matches!(
    store.update_job(99, &update).await,
    Err(Error::NotFound(_))
  ));

  let executions = store.list_executions(first).await.unwrap();
  assert_eq!(executions.len(), 1);
  assert_eq!(executions[0].execution_id, execution.execution_id);
  assert_eq!(executions[0].host_name, "db01");
  assert_eq!(executions[0].outcomes, execution.outcomes);
  assert!(store.list_executions(second).await.unwrap().is_empty());

  store.create_job(&pending_job(second, "wf-2")).await.unwrap();
  let all: Vec<i64> = store
    .list_jobs(None)
    .await
    .unwrap()
    .iter()
    .map(|j| j.job_id)
    .collect();
  assert_eq!(all, vec![second, first]);
  assert_eq!(store.list_jobs(Some("wf-2")).await.unwrap().len(), 1);
}

async fn check_concurrent_job_ids<S: JobStore + 'static>(store: Arc<S>) {
  let handles: Vec<_> = (0..32)
    .map(|_| {
      let store = store.clone();
      tokio::spawn(async move { store.next_job_id().await.unwrap() })
    })
    .collect();

  let mut ids = HashSet::new();
  for handle in handles {
    assert!(ids.insert(handle.await.unwrap()), "job id allocated twice");
  }
  assert_eq!(ids.len(), 32);
}

#[tokio::test]
async fn test_memory_workflow_crud() {
  check_workflow_crud(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_workflow_crud() {
  check_workflow_crud(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_job_lifecycle() {
  check_job_lifecycle(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_job_lifecycle() {
  check_job_lifecycle(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_memory_concurrent_job_ids() {
  check_concurrent_job_ids(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_sqlite_concurrent_job_ids() {
  check_concurrent_job_ids(Arc::new(sqlite_store().await)).await;
}

#[tokio::test]
async fn test_custom_job_id_floor() {
  let memory = MemoryStore::with_job_id_floor(0);
  assert_eq!(memory.next_job_id().await.unwrap(), 1);

  let sqlite = sqlite_store().await.with_job_id_floor(500);
  assert_eq!(sqlite.next_job_id().await.unwrap(), 501);
  assert_eq!(sqlite.next_job_id().await.unwrap(), 502);
}

#[tokio::test]
async fn test_execution_requires_job_in_memory() {
  let store = MemoryStore::new();
  let execution = Execution {
    execution_id: "orphan".to_string(),
    job_id: 42,
    host_name: "h".to_string(),
    outcomes: vec![],
    started_at: Utc::now(),
    completed_at: Utc::now(),
  };
  assert!(matches!(
    store.create_execution(&execution).await,
    Err(Error::NotFound(_))
  ));
}
