use serde::{Deserialize, Serialize};

/// A machine a workflow is dispatched against.
///
/// Supplied by the caller for every run. Legacy inventory key names
/// (`HostName`, `IP`, `SID`, `Instance`) are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHost {
  #[serde(alias = "HostName")]
  pub host_name: String,
  #[serde(alias = "IP")]
  pub address: String,
  /// Caller-side credential reference. Remote steps always connect as the
  /// configured service account.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub credential_user: Option<String>,
  /// Database SID on the host, used by database scripts.
  #[serde(default, alias = "SID", skip_serializing_if = "Option::is_none")]
  pub sid: Option<String>,
  /// Database instance on the host, used by database scripts.
  #[serde(default, alias = "Instance", skip_serializing_if = "Option::is_none")]
  pub instance: Option<String>,
}

impl TargetHost {
  pub fn new(host_name: impl Into<String>, address: impl Into<String>) -> Self {
    Self {
      host_name: host_name.into(),
      address: address.into(),
      credential_user: None,
      sid: None,
      instance: None,
    }
  }
}
