// SPDX-License-Identifier: MIT OR Apache-2.0
//! The docpipe worker binary.

mod config;
mod tasks;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use config::{WorkerSettings, adapter_factory_from_env, publisher_from_env};
use docpipe_backend::{BackendConfig, HealthChecker, build_backend};
use docpipe_executor::{ExecutorEnv, ExecutorRegistry};
use docpipe_storage::StorageRoots;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docpipe-worker", version, about = "docpipe execution worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume queues and execute dispatched operations.
    Run {
        /// Comma-separated queues to consume (required in production).
        #[arg(long, value_delimiter = ',')]
        queues: Vec<String>,

        /// Concurrent task slots (default from TASK_WORKER_CONCURRENCY).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Run the startup health probes and exit non-zero when unhealthy.
    Health {
        /// Emit the probe results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List registered executors.
    Executors,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            queues,
            concurrency,
        } => run_worker(queues, concurrency).await,
        Command::Health { json } => run_health(json).await,
        Command::Executors => {
            register_executors()?;
            for name in ExecutorRegistry::list() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn register_executors() -> anyhow::Result<()> {
    docpipe_legacy::register().context("failed to register the legacy executor")?;
    Ok(())
}

async fn run_worker(queues: Vec<String>, concurrency: Option<usize>) -> anyhow::Result<()> {
    let settings = WorkerSettings::from_env(queues, concurrency)?;
    let backend_config = BackendConfig::from_env().context("task backend configuration")?;
    let backend = build_backend(&backend_config)?;

    register_executors()?;
    let env = ExecutorEnv {
        adapters: adapter_factory_from_env()?,
        storage: Arc::new(StorageRoots::from_env().context("storage configuration")?),
        publisher: publisher_from_env(),
    };
    tasks::register_execution_tasks(backend.as_ref(), env);

    tracing::info!(
        worker = %settings.worker_name,
        backend = %backend_config.backend_type(),
        queues = ?settings.queues,
        concurrency = settings.concurrency,
        executors = ?ExecutorRegistry::list(),
        "worker starting"
    );

    tokio::select! {
        outcome = backend.run_worker(&settings.queues, settings.concurrency) => {
            outcome.context("worker loop exited")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            tracing::info!("shutdown signal received; stopping worker");
        }
    }
    Ok(())
}

async fn run_health(json: bool) -> anyhow::Result<()> {
    let backend_config = BackendConfig::from_env().context("task backend configuration")?;
    let status = HealthChecker::new(backend_config).check_all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for check in &status.checks {
            let verdict = if check.is_healthy() { "ok" } else { "FAIL" };
            println!(
                "{:<20} {:<5} {:>8.1} ms  {}",
                check.name, verdict, check.duration_ms, check.message
            );
        }
        println!(
            "overall: {}",
            if status.is_healthy { "healthy" } else { "unhealthy" }
        );
    }

    if status.is_healthy {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
