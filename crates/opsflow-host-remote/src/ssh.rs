//! Remote execution over the system ssh client.
//!
//! Commands are passed to ssh as the remote command line. Database scripts
//! are streamed over stdin into the configured script runner, with the
//! host's SID exported as `ORACLE_SID`.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

use crate::{RemoteError, RemoteExecutor, RemoteOutput, RemoteRequest};

/// ssh exits with this status when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Configuration for [`SshExecutor`].
#[derive(Debug, Clone)]
pub struct SshConfig {
  /// ssh binary to invoke.
  pub program: String,
  pub connect_timeout: Duration,
  /// Remote command that reads a database script from stdin.
  pub script_runner: String,
  /// Extra arguments placed before the destination (e.g. `-i key`).
  pub extra_args: Vec<String>,
}

impl Default for SshConfig {
  fn default() -> Self {
    Self {
      program: "ssh".to_string(),
      connect_timeout: Duration::from_secs(10),
      script_runner: "sqlplus -S -L / as sysdba".to_string(),
      extra_args: Vec::new(),
    }
  }
}

/// [`RemoteExecutor`] that shells out to `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
  config: SshConfig,
}

impl SshExecutor {
  pub fn new(config: SshConfig) -> Self {
    Self { config }
  }

  /// Arguments for running `remote_command` on the request's host.
  pub fn build_args(&self, request: &RemoteRequest, remote_command: &str) -> Vec<String> {
    let mut args = vec![
      "-o".to_string(),
      "BatchMode=yes".to_string(),
      "-o".to_string(),
      format!("ConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)),
    ];
    args.extend(self.config.extra_args.iter().cloned());
    args.push(format!("{}@{}", request.user, request.address));
    args.push("--".to_string());
    args.push(remote_command.to_string());
    args
  }

  /// Remote command line for a database script.
  pub fn script_command(&self, request: &RemoteRequest) -> String {
    // On clustered databases the instance name is the SID to attach to.
    match request.instance.as_deref().or(request.sid.as_deref()) {
      Some(sid) => format!("ORACLE_SID={} {}", shell_quote(sid), self.config.script_runner),
      None => self.config.script_runner.clone(),
    }
  }

  async fn run(
    &self,
    request: &RemoteRequest,
    remote_command: &str,
    stdin: Option<&str>,
  ) -> Result<RemoteOutput, RemoteError> {
    let args = self.build_args(request, remote_command);
    debug!(address = %request.address, user = %request.user, "ssh_exec");

    let mut child = Command::new(&self.config.program)
      .args(&args)
      .stdin(if stdin.is_some() {
        Stdio::piped()
      } else {
        Stdio::null()
      })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

    // Feed stdin while output is collected so neither side can fill its
    // pipe and stall the other.
    let pipe = child.stdin.take();
    let feed = async move {
      if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
        write_stdin(&mut pipe, input.as_bytes()).await;
      }
    };
    let ((), output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code();

    if exit_code == Some(SSH_CONNECTION_FAILURE) {
      warn!(address = %request.address, stderr = %stderr.trim(), "ssh connection failed");
      return Err(RemoteError::Connection {
        address: request.address.clone(),
        message: stderr.trim().to_string(),
      });
    }

    let mut text = stdout.into_owned();
    if !stderr.trim().is_empty() {
      if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
      }
      text.push_str(&stderr);
    }

    Ok(RemoteOutput {
      output: text,
      success: output.status.success(),
      exit_code,
    })
  }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
  async fn exec_db_script(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError> {
    let command = self.script_command(&request);
    self.run(&request, &command, Some(&request.payload)).await
  }

  async fn exec_command(&self, request: RemoteRequest) -> Result<RemoteOutput, RemoteError> {
    self.run(&request, &request.payload, None).await
  }
}

/// Write `input` and close the pipe.
///
/// A runner that exits without draining stdin closes the pipe early; its
/// exit status and stderr still describe what happened, so write errors are
/// only logged.
async fn write_stdin(pipe: &mut ChildStdin, input: &[u8]) {
  let result = match pipe.write_all(input).await {
    Ok(()) => pipe.shutdown().await,
    Err(e) => Err(e),
  };
  match result {
    Ok(()) => {}
    Err(e) if e.kind() == ErrorKind::BrokenPipe => {
      debug!("remote side closed stdin early");
    }
    Err(e) => warn!(error = %e, "failed to write script to stdin"),
  }
}

/// Quote a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
  format!("'{}'", value.replace('\'', r"'\''"))
}
