mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use electroflow_backend::{BackendRegistry, ParameterValidator};
use electroflow_device::{DeviceSet, Journal};
use electroflow_engine::{
  ChannelNotifier, ConfirmationGate, Decision, Dispatcher, ExecutionEvent, Parallel, RunStatus,
  Sequential, WorkflowExecutor,
};
use electroflow_store::{FsResultStore, StatusTracker};
use electroflow_workflow::WorkflowDefinition;

use crate::config::{AppConfig, CONFIG_FILE, StrategyKind, default_data_dir};

/// Electroflow - run electrochemical lab workflows
#[derive(Parser)]
#[command(name = "electroflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.electroflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to the config file (default: <data_dir>/electroflow.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log filter, e.g. "debug" or "electroflow_engine=trace"
  #[arg(long, global = true)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a workflow file without touching any device
  Validate {
    /// Path to the workflow JSON file
    workflow_file: PathBuf,
  },

  /// Run a workflow or a single experiment
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an entire workflow
  Workflow {
    /// Path to the workflow JSON file
    workflow_file: PathBuf,

    /// Run independent branches concurrently
    #[arg(long)]
    parallel: bool,

    /// Approve every confirmation prompt without asking
    #[arg(long)]
    auto_confirm: bool,
  },

  /// Run one experiment outside of any workflow
  Experiment {
    /// Experiment type, e.g. OCV or CVA
    #[arg(long = "type")]
    uo_type: String,

    /// Parameters as a JSON object
    #[arg(long, default_value = "{}")]
    params: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
  let config_path = cli
    .config
    .clone()
    .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
  let config = AppConfig::load(&config_path)?;

  init_tracing(cli.log_level.as_deref(), &config.logging.level);

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Validate { workflow_file }) => rt.block_on(validate(&workflow_file, &config)),
    Some(Commands::Run { target }) => match target {
      RunTarget::Workflow {
        workflow_file,
        parallel,
        auto_confirm,
      } => rt.block_on(run_workflow(
        &workflow_file,
        &config,
        &data_dir,
        parallel,
        auto_confirm,
      )),
      RunTarget::Experiment { uo_type, params } => {
        rt.block_on(run_experiment(&uo_type, &params, &config, &data_dir))
      }
    },
    None => {
      println!("electroflow - use --help to see available commands");
      Ok(())
    }
  }
}

/// `--log-level` wins, then `RUST_LOG`, then the config file.
fn init_tracing(cli_level: Option<&str>, config_level: &str) {
  let filter = match cli_level {
    Some(level) => EnvFilter::new(level),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level)),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

async fn load_workflow(workflow_file: &Path) -> Result<WorkflowDefinition> {
  let raw = tokio::fs::read_to_string(workflow_file)
    .await
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;

  WorkflowDefinition::load(&raw)
    .with_context(|| format!("invalid workflow file: {}", workflow_file.display()))
}

fn build_dispatcher(
  config: &AppConfig,
  data_dir: &Path,
  notifier: Option<ChannelNotifier>,
) -> Result<Dispatcher> {
  let validator = ParameterValidator::new(config.parameter_limits()?);
  let results = FsResultStore::new(config.results_dir(data_dir));

  let dispatcher = Dispatcher::new(
    Arc::new(BackendRegistry::simulated()),
    Arc::new(StatusTracker::new(config.tracker.retention())),
    Arc::new(results),
  )
  .with_validator(validator)
  .with_config(config.engine.dispatcher()?);

  Ok(match notifier {
    Some(notifier) => dispatcher.with_notifier(Arc::new(notifier)),
    None => dispatcher,
  })
}

async fn validate(workflow_file: &Path, config: &AppConfig) -> Result<()> {
  let workflow = load_workflow(workflow_file).await?;
  let dispatcher = Dispatcher::new(
    Arc::new(BackendRegistry::simulated()),
    Arc::new(StatusTracker::default()),
    Arc::new(electroflow_store::MemoryResultStore::new()),
  )
  .with_validator(ParameterValidator::new(config.parameter_limits()?));

  let mut problems = Vec::new();
  for node in workflow.nodes() {
    let params = node.merged_params(&workflow.global_config);
    if let Err(e) = dispatcher.validate(&node.uo_type, &params).await {
      problems.push(format!("{}: {}", node.id, e));
    }
  }

  if !problems.is_empty() {
    for problem in &problems {
      eprintln!("  {}", problem);
    }
    bail!("{} node(s) have invalid parameters", problems.len());
  }

  println!(
    "Workflow '{}' is valid: {} nodes, {} edges, entry points {:?}",
    workflow.name,
    workflow.nodes().len(),
    workflow.edges().len(),
    workflow.graph().entry_points()
  );
  Ok(())
}

async fn run_workflow(
  workflow_file: &Path,
  config: &AppConfig,
  data_dir: &Path,
  parallel: bool,
  auto_confirm: bool,
) -> Result<()> {
  let workflow = load_workflow(workflow_file).await?;
  eprintln!("Loaded workflow: {}", workflow.name);

  let (notifier, mut events) = ChannelNotifier::channel();
  let dispatcher = Arc::new(build_dispatcher(config, data_dir, Some(notifier))?);
  let devices = DeviceSet::simulated(Journal::new()).with_command_timeout(config.engine.device_timeout()?);
  let gate = Arc::new(ConfirmationGate::new());

  let executor = WorkflowExecutor::new(dispatcher.clone(), devices)
    .with_gate(gate.clone())
    .with_config(config.engine.executor());
  let executor = if parallel || config.engine.strategy == StrategyKind::Parallel {
    executor.with_strategy(Parallel::new(config.engine.max_concurrency))
  } else {
    executor.with_strategy(Sequential)
  };

  // Answer confirmation prompts as they arrive
  let prompts = tokio::spawn(async move {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(event) = events.recv().await {
      let ExecutionEvent::ConfirmationRequested {
        run_id,
        node_id,
        message,
      } = event
      else {
        continue;
      };

      let decision = if auto_confirm {
        info!(node_id = %node_id, "confirmation_auto_approved");
        Decision::Approve
      } else {
        eprint!("[{}] {} [y/N] ", node_id, message);
        match stdin.next_line().await {
          Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y") => Decision::Approve,
          _ => Decision::Reject,
        }
      };

      if let Err(e) = gate.confirm(&run_id, &node_id, decision) {
        warn!(node_id = %node_id, error = %e, "confirmation_not_delivered");
      }
    }
  });

  let cancel = CancellationToken::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling run");
        cancel.cancel();
      }
    }
  });

  let result = executor.run(&workflow, cancel).await;
  drop(executor);
  dispatcher.registry().shutdown().await;
  drop(dispatcher);
  prompts.abort();

  println!("{}", serde_json::to_string_pretty(&result)?);

  match result.status {
    RunStatus::Succeeded => Ok(()),
    RunStatus::CompletedWithErrors => bail!("workflow '{}' completed with errors", result.workflow_name),
    RunStatus::Cancelled => bail!("workflow '{}' was cancelled", result.workflow_name),
  }
}

async fn run_experiment(uo_type: &str, params: &str, config: &AppConfig, data_dir: &Path) -> Result<()> {
  let params: serde_json::Value = serde_json::from_str(params).context("--params must be valid JSON")?;
  let Some(params) = params.as_object().cloned() else {
    bail!("--params must be a JSON object");
  };

  let dispatcher = build_dispatcher(config, data_dir, None)?;
  let experiment = dispatcher
    .dispatch(uo_type, params)
    .await
    .with_context(|| format!("{} experiment was refused", uo_type))?;
  dispatcher.registry().shutdown().await;

  println!("{}", serde_json::to_string_pretty(&experiment)?);

  if let Some(error) = &experiment.error {
    bail!("experiment {} failed: {}", experiment.id, error);
  }
  Ok(())
}
