//! `taskclock`: manage a single-activation task list from the terminal.
//!
//! Talks to a `taskclock-cloud` record service when a cloud URL is
//! configured, otherwise runs against an empty in-memory store.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskclock/config.toml`).
//!
//! ```bash
//! # Offline (in-memory) mode
//! cargo run --bin taskclock -- add "Read"
//!
//! # Against a record service
//! cargo run --bin taskclock -- --cloud-url ws://127.0.0.1:9100/ws \
//!     --user alice activate 0190f3c2-...
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskclock::activation::{ActivationCoordinator, ActivationError, ActivationReport};
use taskclock::config::{CliArgs, ClientConfig, Command};
use taskclock::remote::RemoteSync;
use taskclock::remote::cloud::CloudRemote;
use taskclock::remote::memory::MemoryRemote;
use taskclock::store::{StoreError, TaskStore};
use taskclock_proto::task::TaskRecord;

/// Errors that end a CLI run.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Logs go to a file; stdout carries command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(command = ?cli.command, "taskclock starting");

    let result = if let Some(settings) = config.cloud_settings() {
        match CloudRemote::connect(&settings).await {
            Ok(remote) => run(Arc::new(remote), &config, &cli).await,
            Err(e) => {
                eprintln!("error: could not reach {}: {e}", settings.url);
                return ExitCode::FAILURE;
            }
        }
    } else {
        tracing::info!("no cloud url configured, using in-memory remote");
        run(Arc::new(MemoryRemote::new()), &config, &cli).await
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskclock.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Load the task list and execute one command against it.
async fn run<R: RemoteSync + 'static>(
    remote: Arc<R>,
    config: &ClientConfig,
    cli: &CliArgs,
) -> Result<ExitCode, CliError> {
    let mut store = TaskStore::new(Arc::clone(&remote), config.store_config());
    store.load().await?;
    tracing::info!(backend = %remote.kind(), tasks = store.len(), "task list loaded");

    match &cli.command {
        Command::List => {
            print_tasks(&store.list(), cli.json)?;
        }
        Command::Add { name } => {
            let task = store.create(name).await?;
            print_tasks(std::slice::from_ref(&task), cli.json)?;
        }
        Command::Remove { id } => {
            store.remove(id).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "removed": id }));
            } else {
                println!("removed {id}");
            }
        }
        Command::Activate { id } | Command::Deactivate { id } => {
            let desired = matches!(cli.command, Command::Activate { .. });
            let coordinator =
                ActivationCoordinator::new(store.into_shared(), remote, config.request_timeout);
            let report = coordinator.set_activation(id, desired).await?;
            print_report(&report, cli.json)?;
            if !report.is_complete() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_tasks(tasks: &[TaskRecord], json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("no tasks");
    }
    for task in tasks {
        let marker = if task.is_activated { '*' } else { ' ' };
        println!("{marker} {}  {}", task.id, task.name);
    }
    Ok(())
}

fn print_report(report: &ActivationReport, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for (id, value) in &report.updated {
        let state = if *value { "activated" } else { "deactivated" };
        println!("{state} {id}");
    }
    for (id, failure) in &report.failed {
        println!("failed {id}: {failure}");
    }
    Ok(())
}
