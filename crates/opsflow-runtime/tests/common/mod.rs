//! Fakes shared by the runtime integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use opsflow_config::WorkflowDef;
use opsflow_host_http::{HttpClient, HttpError, HttpResponse, Method};
use opsflow_host_remote::{RemoteError, RemoteExecutor, RemoteOutput, RemoteRequest};
use opsflow_runtime::{DispatchConfig, NodeDispatcher, RunController};
use opsflow_store::{Error, Execution, Job, JobStore, JobUpdate, MemoryStore, WorkflowStore};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A scripted HTTP reply.
#[derive(Debug, Clone)]
pub enum Reply {
  Body(String),
  Status(u16),
  Hang,
}

/// HTTP client answering from per-url reply queues.
///
/// Each call pops the next reply for its url; the last reply repeats. Urls
/// with no replies answer 404.
#[derive(Default)]
pub struct FakeHttp {
  routes: Mutex<HashMap<String, VecDeque<Reply>>>,
  calls: Mutex<Vec<(Method, String)>>,
}

impl FakeHttp {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(self, url: &str, replies: Vec<Reply>) -> Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), replies.into());
    self
  }

  pub fn calls(&self) -> Vec<(Method, String)> {
    self.calls.lock().unwrap().clone()
  }

  fn next_reply(&self, url: &str) -> Reply {
    let mut routes = self.routes.lock().unwrap();
    match routes.get_mut(url) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
      Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
      None => Reply::Status(404),
    }
  }
}

#[async_trait]
impl HttpClient for FakeHttp {
  async fn request(&self, method: Method, url: &str) -> Result<HttpResponse, HttpError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((method, url.to_string()));

    match self.next_reply(url) {
      Reply::Body(body) => Ok(HttpResponse { status: 200, body }),
      Reply::Status(status) => Err(HttpError::Status {
        status,
        body: "error".to_string(),
      }),
      Reply::Hang => std::future::pending().await,
    }
  }
}

/// How a fake host answers remote calls.
#[derive(Clone)]
pub enum Behavior {
  Output { output: String, success: bool },
  NoResponse,
  Hang,
  /// Wait for the notify, then answer with `output` successfully.
  Gated { gate: Arc<Notify>, output: String },
}

impl Behavior {
  pub fn ok(output: &str) -> Self {
    Behavior::Output {
      output: output.to_string(),
      success: true,
    }
  }

  pub fn exit_failure(output: &str) -> Self {
    Behavior::Output {
      output: output.to_string(),
      success: false,
    }
  }
}

/// A recorded remote call.
#[derive(Debug, Clone)]
pub struct RemoteCall {
  pub kind: &'static str,
  pub request: RemoteRequest,
  pub at: Instant,
}

/// Remote executor whose behaviour is chosen per host address.
///
/// Addresses with no behaviour answer `ok` with the payload echoed back.
#[derive(Default)]
pub struct FakeRemote {
  behaviors: Mutex<HashMap<String, Behavior>>,
  calls: Mutex<Vec<RemoteCall>>,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn host(self, address: &str, behavior: Behavior) -> Self {
    self
      .behaviors
      .lock()
      .unwrap()
      .insert(address.to_string(), behavior);
    self
  }

  pub fn calls(&self) -> Vec<RemoteCall> {
    self.calls.lock().unwrap().clone()
  }

  async fn answer(
    &self,
    kind: &'static str,
    request: RemoteRequest,
  ) -> Result<RemoteOutput, RemoteError> {
    let behavior = self.behaviors.lock().unwrap().get(&request.address).cloned();
    let payload = request.payload.clone();
    let address = request.address.clone();
    self.calls.lock().unwrap().push(RemoteCall {
      kind,
      request,
      at: Instant::now(),
    });

    match behavior {
      None => Ok(output(&payload, true)),
      Some(Behavior::Output { output: text, success }) => Ok(output(&text, success)),
      Some(Behavior::NoResponse) => Err(RemoteError::Connection {
        address,
        message: "connection refused".to_string(),
      }),
      Some(Behavior::Hang) => std::future::pending().await,
      Some(Behavior::Gated { gate, output: text }) => {
        gate.notified().await;
        Ok(output(&text, true))
      }
    }
  }
}

fn output(text: &str, success: bool) -> RemoteOutput {
  RemoteOutput {
    output: text.to_string(),
    success,
    exit_code: Some(if success { 0 } else { 1 }),
  }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
  async fn exec_db_script(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError> {
    self.answer("script", request).await
  }

  async fn exec_command(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError> {
    self.answer("command", request).await
  }
}

/// Job store that refuses to save the execution of one host.
pub struct FailingExecutions {
  pub inner: Arc<MemoryStore>,
  pub host_name: String,
}

#[async_trait]
impl JobStore for FailingExecutions {
  async fn next_job_id(&self) -> Result<i64, Error> {
    self.inner.next_job_id().await
  }

  async fn create_job(&self, job: &Job) -> Result<(), Error> {
    self.inner.create_job(job).await
  }

  async fn update_job(&self, job_id: i64, update: &JobUpdate) -> Result<(), Error> {
    self.inner.update_job(job_id, update).await
  }

  async fn get_job(&self, job_id: i64) -> Result<Job, Error> {
    self.inner.get_job(job_id).await
  }

  async fn list_jobs(&self, workflow_id: Option<&str>) -> Result<Vec<Job>, Error> {
    self.inner.list_jobs(workflow_id).await
  }

  async fn create_execution(&self, execution: &Execution) -> Result<(), Error> {
    if execution.host_name == self.host_name {
      return Err(Error::Conflict(format!(
        "execution {} rejected",
        execution.execution_id
      )));
    }
    self.inner.create_execution(execution).await
  }

  async fn list_executions(&self, job_id: i64) -> Result<Vec<Execution>, Error> {
    self.inner.list_executions(job_id).await
  }
}

/// Build a workflow definition from nodes and a plain-id execution order.
pub fn workflow(id: &str, nodes: Value, order: &[&str]) -> WorkflowDef {
  serde_json::from_value(serde_json::json!({
    "id": id,
    "name": format!("{} workflow", id),
    "nodes": nodes,
    "executionOrder": order,
  }))
  .expect("valid workflow definition")
}

/// Everything a test needs to drive a run.
pub struct Harness {
  pub store: Arc<MemoryStore>,
  pub http: Arc<FakeHttp>,
  pub remote: Arc<FakeRemote>,
  pub controller: Arc<RunController>,
}

impl Harness {
  pub async fn new(
    definition: WorkflowDef,
    http: FakeHttp,
    remote: FakeRemote,
    config: DispatchConfig,
  ) -> Self {
    let store = Arc::new(MemoryStore::new());
    store
      .create_workflow(&definition)
      .await
      .expect("store workflow");

    let http = Arc::new(http);
    let remote = Arc::new(remote);
    let dispatcher = NodeDispatcher::new(http.clone(), remote.clone(), config);
    let controller = Arc::new(RunController::new(store.clone(), store.clone(), dispatcher));

    Self {
      store,
      http,
      remote,
      controller,
    }
  }
}
