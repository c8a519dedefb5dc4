use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use opsflow_config::{TargetHost, WorkflowDef};
use opsflow_host_http::ReqwestClient;
use opsflow_host_remote::SshExecutor;
use opsflow_runtime::{ChannelNotifier, ExecutionEvent, NodeDispatcher, RunController, RunRequest};
use opsflow_store::{JobStore, SqliteStore, WorkflowStore};
use opsflow_workflow::Workflow;

mod config;

use config::AppConfig;

/// Opsflow - run operational workflows against fleets of hosts
#[derive(Parser)]
#[command(name = "opsflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.opsflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a stored workflow against a set of hosts
  Run {
    /// Id of the stored workflow
    workflow_id: String,

    /// JSON file holding the target hosts
    #[arg(long)]
    hosts: PathBuf,

    /// Who the job is recorded as created by
    #[arg(long)]
    created_by: Option<String>,
  },

  /// Manage stored workflows
  Workflow {
    #[command(subcommand)]
    action: WorkflowAction,
  },

  /// Inspect jobs
  Job {
    #[command(subcommand)]
    action: JobAction,
  },
}

#[derive(Subcommand)]
enum WorkflowAction {
  /// Create or replace a workflow from a JSON file
  Import { file: PathBuf },

  /// List workflows
  List {
    /// Only workflows whose name contains this text
    #[arg(long)]
    search: Option<String>,

    /// Only workflows in this state
    #[arg(long)]
    state: Option<String>,
  },

  /// Print a workflow definition
  Show { id: String },

  /// Delete a workflow
  Delete { id: String },
}

#[derive(Subcommand)]
enum JobAction {
  /// Print a job and its per-host executions
  Show { job_id: i64 },

  /// List jobs, newest first
  List {
    #[arg(long)]
    workflow: Option<String>,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".opsflow"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(execute(cli.command, data_dir))
}

async fn execute(command: Commands, data_dir: PathBuf) -> Result<ExitCode> {
  let config = AppConfig::load(&data_dir).await?;
  let store = Arc::new(open_store(&config, &data_dir).await?);

  match command {
    Commands::Run {
      workflow_id,
      hosts,
      created_by,
    } => {
      let created_by = created_by.unwrap_or_else(|| config.dispatch.created_by.clone());
      run_workflow(&config, store, workflow_id, &hosts, created_by).await
    }
    Commands::Workflow { action } => {
      workflow_command(store.as_ref(), action).await?;
      Ok(ExitCode::SUCCESS)
    }
    Commands::Job { action } => {
      job_command(store.as_ref(), action).await?;
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

async fn open_store(config: &AppConfig, data_dir: &Path) -> Result<SqliteStore> {
  let path = config.database_path(data_dir);
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }

  let options = SqliteConnectOptions::new()
    .filename(&path)
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .with_context(|| format!("failed to open database {}", path.display()))?;

  let store = SqliteStore::new(pool).with_job_id_floor(config.job_id_floor());
  store.migrate().await.context("failed to migrate database")?;
  Ok(store)
}

async fn run_workflow(
  config: &AppConfig,
  store: Arc<SqliteStore>,
  workflow_id: String,
  hosts_file: &Path,
  created_by: String,
) -> Result<ExitCode> {
  let content = tokio::fs::read_to_string(hosts_file)
    .await
    .with_context(|| format!("failed to read hosts file: {}", hosts_file.display()))?;
  let hosts: Vec<TargetHost> = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse hosts file: {}", hosts_file.display()))?;

  let http = ReqwestClient::new(config.http_config()).context("failed to create http client")?;
  let remote = SshExecutor::new(config.ssh_config());
  let dispatcher = NodeDispatcher::new(Arc::new(http), Arc::new(remote), config.dispatch_config());

  let (sender, mut receiver) = mpsc::unbounded_channel();
  let controller = RunController::with_notifier(
    store.clone(),
    store,
    dispatcher,
    Arc::new(ChannelNotifier::new(sender)),
  );

  // Progress goes to stderr so stdout carries only the result.
  let progress = tokio::spawn(async move {
    while let Some(event) = receiver.recv().await {
      report(&event);
    }
  });

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupted, cancelling run...");
      on_interrupt.cancel();
    }
  });

  let request = RunRequest::new(workflow_id, hosts, created_by);
  let result = controller.execute_workflow(request, cancel).await;

  // Dropping the controller closes the event channel.
  drop(controller);
  let _ = progress.await;

  let result = result.context("workflow run failed")?;
  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(if result.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn report(event: &ExecutionEvent) {
  match event {
    ExecutionEvent::JobStarted {
      job_id, host_count, ..
    } => eprintln!("Job {} started on {} host(s)", job_id, host_count),
    ExecutionEvent::HostStarted { host_name, .. } => eprintln!("[{}] started", host_name),
    ExecutionEvent::StepCompleted { outcome, .. } => eprintln!(
      "[{}] {} {}",
      outcome.host_name,
      outcome.node_id,
      if outcome.failed { "failed" } else { "ok" }
    ),
    ExecutionEvent::HostCompleted {
      host_name,
      failed_steps,
      ..
    } => eprintln!("[{}] finished, {} failed step(s)", host_name, failed_steps),
    ExecutionEvent::JobCompleted { job_id, status } => {
      eprintln!("Job {} completed: {:?}", job_id, status)
    }
  }
}

async fn workflow_command(store: &SqliteStore, action: WorkflowAction) -> Result<()> {
  match action {
    WorkflowAction::Import { file } => {
      let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read workflow file: {}", file.display()))?;
      let def: WorkflowDef = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse workflow file: {}", file.display()))?;

      // Drafts may be stored before they compile.
      if let Err(e) = Workflow::compile(&def) {
        eprintln!("Warning: workflow '{}' will not run as stored: {}", def.id, e);
      }

      import_workflow(store, &def).await?;
    }
    WorkflowAction::List { search, state } => {
      let workflows = store
        .list_workflows(search.as_deref(), state.as_deref())
        .await?;
      for def in workflows {
        println!(
          "{}\t{}\t{}",
          def.id,
          def.name,
          def.state.as_deref().unwrap_or("-")
        );
      }
    }
    WorkflowAction::Show { id } => {
      let def = store
        .get_workflow(&id)
        .await
        .with_context(|| format!("workflow '{}'", id))?;
      println!("{}", serde_json::to_string_pretty(&def)?);
    }
    WorkflowAction::Delete { id } => {
      store
        .delete_workflow(&id)
        .await
        .with_context(|| format!("workflow '{}'", id))?;
      eprintln!("Deleted workflow: {}", id);
    }
  }
  Ok(())
}

/// Create the workflow, or replace it when the id already exists.
async fn import_workflow(store: &dyn WorkflowStore, def: &WorkflowDef) -> Result<()> {
  match store.create_workflow(def).await {
    Ok(()) => eprintln!("Imported workflow: {}", def.id),
    Err(opsflow_store::Error::Conflict(_)) => {
      store.update_workflow(def).await?;
      eprintln!("Updated workflow: {}", def.id);
    }
    Err(e) => return Err(e.into()),
  }
  Ok(())
}

async fn job_command(store: &SqliteStore, action: JobAction) -> Result<()> {
  match action {
    JobAction::Show { job_id } => {
      let job = store
        .get_job(job_id)
        .await
        .with_context(|| format!("job {}", job_id))?;
      let executions = store.list_executions(job_id).await?;
      let output = serde_json::json!({
        "job": job,
        "executions": executions,
      });
      println!("{}", serde_json::to_string_pretty(&output)?);
    }
    JobAction::List { workflow } => {
      let jobs = store.list_jobs(workflow.as_deref()).await?;
      for job in jobs {
        println!(
          "{}\t{}\t{:?}\t{}\t{}",
          job.job_id,
          job.workflow_id,
          job.status,
          job.created_by,
          job.created_at.to_rfc3339()
        );
      }
    }
  }
  Ok(())
}
