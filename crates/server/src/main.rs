// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeworks Dispatcher (pipeworksd)
//!
//! Owns the authoritative job queue: accepts enqueues from the front-end,
//! leases jobs to workers, forwards finished reports, and reaps expired
//! leases.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]

use pw_core::{Config, SystemClock};
use pw_server::{build_router, reaper, AppState};
use pw_storage::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_args()?;
    let config = Arc::new(Config::load(&config_path)?);

    let _log_guard = setup_logging(&config)?;
    info!("starting dispatcher");

    let store = Store::open(&config.database.url).await?;
    let clock = Arc::new(SystemClock);
    let state = AppState::new(store.clone(), Arc::clone(&config), clock.clone());

    let cancel = CancellationToken::new();
    let reaper_handle = reaper::spawn_reaper(
        store,
        Arc::clone(&config),
        clock,
        state.webhook.clone(),
        cancel.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "dispatcher listening");

    let shutdown = cancel.clone();
    let serve = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = wait_for_signal() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }

    cancel.cancel();
    let _ = reaper_handle.await;
    info!("dispatcher stopped");
    Ok(())
}

/// `pipeworksd [--config <path>]`
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
                println!("pipeworksd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                println!("pipeworksd {}", env!("CARGO_PKG_VERSION"));
                println!("Pipeworks dispatcher - job queue, lease reaper, webhook forwarder");
                println!();
                println!("USAGE:");
                println!("    pipeworksd [--config <path>]");
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

    let file_appender = tracing_appender::rolling::daily(&log_dir, "pipeworksd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(guard)
}
