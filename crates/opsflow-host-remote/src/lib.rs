//! Remote execution capability.
//!
//! Script and command steps are executed on target hosts through the
//! [`RemoteExecutor`] trait. Each call resolves to either a captured
//! response ([`RemoteOutput`]) or a [`RemoteError`] meaning no response
//! was obtained from the host at all.
//!
//! [`SshExecutor`] is the production implementation and shells out to the
//! system `ssh` client.

mod error;
mod ssh;

pub use error::RemoteError;
pub use ssh::{SshConfig, SshExecutor};

use async_trait::async_trait;

/// Everything needed to run one payload on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
  /// Address to connect to.
  pub address: String,
  /// Account to connect as.
  pub user: String,
  /// Script text or shell command.
  pub payload: String,
  pub sid: Option<String>,
  pub instance: Option<String>,
}

/// A response captured from a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutput {
  pub output: String,
  /// Whether the remote side reported success (exit status 0).
  pub success: bool,
  pub exit_code: Option<i32>,
}

/// Executes payloads on remote hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
  /// Run a database script on the host.
  async fn exec_db_script(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError>;

  /// Run a shell command on the host.
  async fn exec_command(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError>;
}
