//! Application configuration.
//!
//! Read from `{data_dir}/config.toml`. Every key is optional; a missing file
//! means all defaults, while a file that exists but does not parse is an
//! error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use opsflow_host_http::HttpConfig;
use opsflow_host_remote::SshConfig;
use opsflow_runtime::DispatchConfig;
use opsflow_store::DEFAULT_JOB_ID_FLOOR;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub dispatch: DispatchSection,
  pub http: HttpSection,
  pub ssh: SshSection,
  pub store: StoreSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
  pub service_account: String,
  /// 0 disables the step timeout.
  pub step_timeout_secs: u64,
  pub host_timeout_secs: Option<u64>,
  pub continue_on_step_failure: bool,
  /// Recorded as the job's creator when `--created-by` is not given.
  pub created_by: String,
}

impl Default for DispatchSection {
  fn default() -> Self {
    Self {
      service_account: "clouduser".to_string(),
      step_timeout_secs: 600,
      host_timeout_secs: None,
      continue_on_step_failure: true,
      created_by: "opsflow".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpSection {
  pub timeout_secs: Option<u64>,
  pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SshSection {
  pub program: Option<String>,
  pub connect_timeout_secs: Option<u64>,
  pub script_runner: Option<String>,
  pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
  /// Defaults to `{data_dir}/opsflow.db`.
  pub database: Option<PathBuf>,
  pub job_id_floor: Option<i64>,
}

impl AppConfig {
  /// Load `{data_dir}/config.toml`.
  pub async fn load(data_dir: &Path) -> Result<Self> {
    let path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Self::default());
      }
      Err(e) => {
        return Err(e).with_context(|| format!("failed to read {}", path.display()));
      }
    };

    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
  }

  pub fn dispatch_config(&self) -> DispatchConfig {
    let dispatch = &self.dispatch;
    DispatchConfig {
      service_account: dispatch.service_account.clone(),
      step_timeout: (dispatch.step_timeout_secs > 0)
        .then(|| Duration::from_secs(dispatch.step_timeout_secs)),
      host_timeout: dispatch.host_timeout_secs.map(Duration::from_secs),
      continue_on_step_failure: dispatch.continue_on_step_failure,
    }
  }

  pub fn http_config(&self) -> HttpConfig {
    let mut config = HttpConfig::default();
    if let Some(secs) = self.http.timeout_secs {
      config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(user_agent) = &self.http.user_agent {
      config.user_agent = user_agent.clone();
    }
    config
  }

  pub fn ssh_config(&self) -> SshConfig {
    let mut config = SshConfig::default();
    if let Some(program) = &self.ssh.program {
      config.program = program.clone();
    }
    if let Some(secs) = self.ssh.connect_timeout_secs {
      config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(runner) = &self.ssh.script_runner {
      config.script_runner = runner.clone();
    }
    config.extra_args = self.ssh.extra_args.clone();
    config
  }

  pub fn database_path(&self, data_dir: &Path) -> PathBuf {
    self
      .store
      .database
      .clone()
      .unwrap_or_else(|| data_dir.join("opsflow.db"))
  }

  pub fn job_id_floor(&self) -> i64 {
    self.store.job_id_floor.unwrap_or(DEFAULT_JOB_ID_FLOOR)
  }
}
