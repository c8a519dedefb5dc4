//! Routing a single step to its execution strategy.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use opsflow_config::TargetHost;
use opsflow_host_http::{HttpClient, Method};
use opsflow_host_remote::{RemoteError, RemoteExecutor, RemoteOutput, RemoteRequest};
use opsflow_store::StepOutcome;
use opsflow_workflow::{HttpVerb, Step, StepNode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DispatchConfig;

/// Output recorded when a host gave no response to a script or command.
pub const FAILED_TO_CONNECT: &str = "Failed to connect to server";

/// Output recorded when the run was cancelled while a step was in flight.
pub const STEP_CANCELLED: &str = "step cancelled";

/// Executes one step against one host.
///
/// Ordinary failures (transport errors, non-2xx responses, unreachable
/// hosts, timeouts) never surface as errors; they are encoded in the
/// returned [`StepOutcome`].
pub struct NodeDispatcher {
  http: Arc<dyn HttpClient>,
  remote: Arc<dyn RemoteExecutor>,
  config: DispatchConfig,
}

impl NodeDispatcher {
  pub fn new(
    http: Arc<dyn HttpClient>,
    remote: Arc<dyn RemoteExecutor>,
    config: DispatchConfig,
  ) -> Self {
    Self {
      http,
      remote,
      config,
    }
  }

  pub fn config(&self) -> &DispatchConfig {
    &self.config
  }

  /// Execute `node` against `host`.
  ///
  /// Delay steps suspend only the calling task and return `None`: they
  /// produce no outcome and never count toward the job status.
  pub async fn dispatch(
    &self,
    node: &StepNode,
    host: &TargetHost,
    cancel: &CancellationToken,
  ) -> Option<StepOutcome> {
    let call: BoxFuture<'_, (String, bool)> = match &node.step {
      Step::Delay(duration) => {
        self.wait(*duration, cancel).await;
        return None;
      }
      Step::Api { verb, url } => self.call_api(*verb, url).boxed(),
      Step::Script { script } => async move {
        let request = self.remote_request(host, script);
        remote_result(self.remote.exec_db_script(request).await)
      }
      .boxed(),
      Step::Command { command } => async move {
        let request = self.remote_request(host, command);
        remote_result(self.remote.exec_command(request).await)
      }
      .boxed(),
    };

    let (output, failed) = self.bounded(call, cancel).await;
    if failed {
      warn!(
        host = %host.host_name,
        node_id = %node.node_id,
        step = node.step.kind(),
        output = %output,
        "step failed"
      );
    } else {
      debug!(host = %host.host_name, node_id = %node.node_id, step = node.step.kind(), "step succeeded");
    }

    Some(StepOutcome {
      node_id: node.node_id.clone(),
      host_name: host.host_name.clone(),
      output,
      failed,
    })
  }

  async fn wait(&self, duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
  }

  /// Apply the step timeout and run-level cancellation to a call.
  async fn bounded(
    &self,
    call: BoxFuture<'_, (String, bool)>,
    cancel: &CancellationToken,
  ) -> (String, bool) {
    let limited = async {
      match self.config.step_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
          .await
          .unwrap_or_else(|_| (format!("step timed out after {:?}", limit), true)),
        None => call.await,
      }
    };

    tokio::select! {
        result = limited => result,
        _ = cancel.cancelled() => (STEP_CANCELLED.to_string(), true),
    }
  }

  async fn call_api(&self, verb: HttpVerb, url: &str) -> (String, bool) {
    match self.http.request(method(verb), url).await {
      Ok(response) => {
        debug!(verb = %verb, url, status = response.status, "api_response");
        (serialize_body(&response.body), false)
      }
      Err(e) => (e.to_string(), true),
    }
  }

  /// Remote calls always run as the configured service account.
  fn remote_request(&self, host: &TargetHost, payload: &str) -> RemoteRequest {
    RemoteRequest {
      address: host.address.clone(),
      user: self.config.service_account.clone(),
      payload: payload.to_string(),
      sid: host.sid.clone(),
      instance: host.instance.clone(),
    }
  }
}

fn method(verb: HttpVerb) -> Method {
  match verb {
    HttpVerb::Get => Method::GET,
    HttpVerb::Post => Method::POST,
    HttpVerb::Put => Method::PUT,
    HttpVerb::Patch => Method::PATCH,
    HttpVerb::Delete => Method::DELETE,
    HttpVerb::Head => Method::HEAD,
  }
}

fn remote_result(result: Result<RemoteOutput, RemoteError>) -> (String, bool) {
  match result {
    Ok(response) => {
      if !response.success {
        debug!(exit_code = ?response.exit_code, "remote step exited unsuccessfully");
      }
      (response.output, !response.success)
    }
    Err(e) => {
      debug!(error = %e, "no response from host");
      (FAILED_TO_CONNECT.to_string(), true)
    }
  }
}

/// Serialize a response body for the outcome log.
///
/// JSON bodies are re-serialized compactly; anything else is stored as a
/// JSON string.
fn serialize_body(body: &str) -> String {
  match serde_json::from_str::<serde_json::Value>(body) {
    Ok(value) => value.to_string(),
    Err(_) => serde_json::Value::String(body.to_string()).to_string(),
  }
}
