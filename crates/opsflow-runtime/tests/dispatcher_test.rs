//! Tests for NodeDispatcher::dispatch on single steps.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, FakeHttp, FakeRemote, Reply};
use opsflow_config::TargetHost;
use opsflow_host_http::Method;
use opsflow_runtime::{DispatchConfig, NodeDispatcher, STEP_CANCELLED};
use opsflow_workflow::{HttpVerb, Step, StepNode};
use tokio_util::sync::CancellationToken;

fn node(id: &str, step: Step) -> StepNode {
  StepNode {
    node_id: id.to_string(),
    step,
  }
}

#[tokio::test]
async fn test_api_verbs_reach_the_client() {
  let http = Arc::new(FakeHttp::new().route(
    "http://svc.local/items",
    vec![Reply::Body("[ 1, 2 ]".to_string())],
  ));
  let dispatcher = NodeDispatcher::new(
    http.clone(),
    Arc::new(FakeRemote::new()),
    DispatchConfig::default(),
  );
  let host = TargetHost::new("A", "10.0.0.1");
  let cancel = CancellationToken::new();

  for verb in [HttpVerb::Get, HttpVerb::Post, HttpVerb::Delete] {
    let step = node(
      "api",
      Step::Api {
        verb,
        url: "http://svc.local/items".to_string(),
      },
    );
    let outcome = dispatcher.dispatch(&step, &host, &cancel).await.unwrap();
    assert!(!outcome.failed);
    assert_eq!(outcome.output, "[1,2]");
    assert_eq!(outcome.host_name, "A");
  }

  let methods: Vec<_> = http.calls().into_iter().map(|(m, _)| m).collect();
  assert_eq!(methods, vec![Method::GET, Method::POST, Method::DELETE]);
}

#[tokio::test]
async fn test_api_error_status_is_failed() {
  let http = FakeHttp::new().route("http://svc.local/down", vec![Reply::Status(503)]);
  let dispatcher = NodeDispatcher::new(
    Arc::new(http),
    Arc::new(FakeRemote::new()),
    DispatchConfig::default(),
  );

  let step = node(
    "api",
    Step::Api {
      verb: HttpVerb::Put,
      url: "http://svc.local/down".to_string(),
    },
  );
  let outcome = dispatcher
    .dispatch(&step, &TargetHost::new("A", "10.0.0.1"), &CancellationToken::new())
    .await
    .unwrap();

  assert!(outcome.failed);
  assert_eq!(outcome.output, "request failed with status 503: error");
}

#[tokio::test(start_paused = true)]
async fn test_delay_has_no_outcome() {
  let dispatcher = NodeDispatcher::new(
    Arc::new(FakeHttp::new()),
    Arc::new(FakeRemote::new()),
    DispatchConfig::default(),
  );

  let started = tokio::time::Instant::now();
  let outcome = dispatcher
    .dispatch(
      &node("wait", Step::Delay(Duration::from_millis(1500))),
      &TargetHost::new("A", "10.0.0.1"),
      &CancellationToken::new(),
    )
    .await;

  assert!(outcome.is_none());
  assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test]
async fn test_cancelled_before_call_completes() {
  let remote = FakeRemote::new().host("10.0.0.1", Behavior::Hang);
  let config = DispatchConfig {
    step_timeout: None,
    ..DispatchConfig::default()
  };
  let dispatcher = NodeDispatcher::new(Arc::new(FakeHttp::new()), Arc::new(remote), config);

  let cancel = CancellationToken::new();
  cancel.cancel();
  let outcome = dispatcher
    .dispatch(
      &node(
        "sql",
        Step::Script {
          script: "select 1 from dual;".to_string(),
        },
      ),
      &TargetHost::new("A", "10.0.0.1"),
      &cancel,
    )
    .await
    .unwrap();

  assert!(outcome.failed);
  assert_eq!(outcome.output, STEP_CANCELLED);
}
