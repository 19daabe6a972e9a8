// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeworks Worker (pipeworks-worker)
//!
//! Hosts the worker pool: leases jobs from the dispatcher over HTTP, runs
//! the DAG executor against the shared store, and reports terminal state.
//! SIGTERM drains in-flight work and returns leased jobs to the queue.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]

use pw_core::{Config, SystemClock};
use pw_engine::{DagExecutor, NodeRegistry, PromptNode, SetVariablesNode, TemplateNode};
use pw_gateway::HttpProvider;
use pw_storage::Store;
use pw_worker::{HttpDispatchClient, JobRunner, WorkerPool, WorkerPoolConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Pipeline kinds served when the settings table is empty.
const DEFAULT_KINDS: [&str; 2] = ["Prof", "BigFive"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_args()?;
    let config = Arc::new(Config::load(&config_path)?);

    let _log_guard = setup_logging(&config)?;
    info!("starting worker pool");

    let store = Store::open(&config.database.url).await?;
    let clock = Arc::new(SystemClock);

    // One gateway per process: token cache and breaker are shared.
    let provider = Arc::new(HttpProvider::new(
        &config.provider,
        &config.breaker,
        &config.iam,
        clock.clone(),
    )?);

    // Node kinds are registered once at startup; the executor stays
    // closed to their internals.
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(TemplateNode));
    registry.register(Arc::new(SetVariablesNode));
    registry.register(Arc::new(PromptNode::new(provider)));

    let executor = Arc::new(DagExecutor::new(
        store.clone(),
        Arc::new(registry),
        config.progress.log_dir.clone(),
        config.executor.parallelism,
        clock.clone(),
    ));

    let client = Arc::new(HttpDispatchClient::new(
        format!("http://{}", config.server.bind_addr),
        config.server.backend_secret.clone(),
    ));
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        executor,
        client.clone(),
        Arc::clone(&config),
        clock,
    ));

    // Pool sizing from the dispatcher settings table; changes are picked
    // up on restart.
    let kinds = store.get_worker_settings().await?;
    let pool_config = if kinds.is_empty() {
        WorkerPoolConfig::default_for(&DEFAULT_KINDS)
    } else {
        WorkerPoolConfig { kinds }
    };

    let cancel = CancellationToken::new();
    let pool = WorkerPool::start(pool_config, runner, client, cancel.clone());

    wait_for_signal().await;
    info!("shutdown signal received, draining workers");
    cancel.cancel();
    pool.shutdown().await;
    info!("worker pool stopped");
    Ok(())
}

/// `pipeworks-worker [--config <path>]`
fn parse_args() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("pipeworks.toml");
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = PathBuf::from(
                    args.next()
                        .ok_or("--config requires a path")?,
                );
            }
            "--version" | "-V" => {
                println!("pipeworks-worker {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                println!("pipeworks-worker {}", env!("CARGO_PKG_VERSION"));
                println!("Pipeworks worker pool - leases jobs and runs DAG projects");
                println!();
                println!("USAGE:");
                println!("    pipeworks-worker [--config <path>]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <path>    Config file (default: pipeworks.toml)");
                println!("    -h, --help             Print help information");
                println!("    -V, --version          Print version information");
                std::process::exit(0);
            }
            other => {
                return Err(format!("unexpected argument '{other}'").into());
            }
        }
    }
    Ok(config_path)
}

async fn wait_for_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config.progress.log_dir.clone();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "pipeworks-worker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(guard)
}
