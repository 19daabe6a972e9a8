// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker pool: N cooperative lease loops per pipeline kind.

use crate::client::DispatchApi;
use crate::runner::JobRunner;
use pw_core::api::WorkerSettings;
use pw_core::WorkerId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-kind pool sizing, usually loaded from the dispatcher settings
/// table. Changes are honored on worker restart.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub kinds: BTreeMap<String, WorkerSettings>,
}

impl WorkerPoolConfig {
    /// One worker per kind with default polling.
    pub fn default_for(kinds: &[&str]) -> Self {
        Self {
            kinds: kinds
                .iter()
                .map(|k| (k.to_string(), WorkerSettings::default()))
                .collect(),
        }
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn every worker loop. The pool shares one runner and one
    /// dispatch client.
    pub fn start(
        config: WorkerPoolConfig,
        runner: Arc<JobRunner>,
        client: Arc<dyn DispatchApi>,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::new();
        for (kind, settings) in &config.kinds {
            for n in 0..settings.instances.max(1) {
                let worker_id = WorkerId::new(format!(
                    "{}-{}-{}",
                    kind.to_lowercase(),
                    n,
                    WorkerId::generate().short(8)
                ));
                handles.push(spawn_worker(
                    worker_id,
                    kind.clone(),
                    settings.clone(),
                    Arc::clone(&runner),
                    Arc::clone(&client),
                    cancel.clone(),
                ));
            }
        }
        tracing::info!(workers = handles.len(), "worker pool started");
        Self { handles, cancel }
    }

    /// Signal shutdown and wait for in-flight work to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task aborted");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

fn spawn_worker(
    worker_id: WorkerId,
    kind: String,
    settings: WorkerSettings,
    runner: Arc<JobRunner>,
    client: Arc<dyn DispatchApi>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll = Duration::from_millis(settings.poll_interval_ms.max(1));
        let batch = settings.max_concurrent_jobs.max(1);
        tracing::info!(worker_id = %worker_id, kind, "worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let jobs = match client.lease(worker_id.as_str(), &kind, batch).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!(worker_id = %worker_id, error = %e, "lease request failed");
                    if sleep_or_cancel(poll, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            if jobs.is_empty() {
                if sleep_or_cancel(poll, &cancel).await {
                    break;
                }
                continue;
            }

            for job in &jobs {
                // The runner observes the same token: on shutdown the
                // in-flight node finishes and the job goes back queued.
                runner.run_job(job, &cancel).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
        tracing::info!(worker_id = %worker_id, "worker stopped");
    })
}

/// Sleep for `duration`, returning true when cancelled instead.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
