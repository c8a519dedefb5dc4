use std::time::Duration;

/// Configuration for dispatching steps.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
  /// Account used for remote execution when a host names none.
  pub service_account: String,
  /// Upper bound for a single api/script/command step.
  pub step_timeout: Option<Duration>,
  /// Upper bound for a host's whole step sequence.
  pub host_timeout: Option<Duration>,
  /// Keep running a host's remaining steps after one fails.
  pub continue_on_step_failure: bool,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      service_account: "clouduser".to_string(),
      step_timeout: Some(Duration::from_secs(600)),
      host_timeout: None,
      continue_on_step_failure: true,
    }
  }
}
