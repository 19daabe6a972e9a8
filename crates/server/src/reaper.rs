// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease reaper: returns expired leases to the queue.
//!
//! Runs every `server.reap_interval_ms`. A job reaped past the retry bound
//! fails with a "max retries" message; its session and batch are updated
//! and the terminal webhook fires like any worker-reported failure — the
//! dead-worker case is exactly the one the front-end would otherwise
//! never hear about.

use crate::webhook::WebhookSender;
use pw_core::api::JobUpdate;
use pw_core::{format_epoch_ms, Clock, Config, JobStatus};
use pw_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One sweep. Returns (requeued, failed) job ids.
pub async fn reap_once(
    store: &Store,
    config: &Config,
    clock: &dyn Clock,
    webhook: &WebhookSender,
) -> (Vec<String>, Vec<String>) {
    let now = clock.epoch_ms();
    let outcome = match store.reap_expired(now, config.lease.max_retries).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "reap sweep failed");
            return (Vec::new(), Vec::new());
        }
    };

    for job_id in &outcome.requeued {
        tracing::info!(job_id, "lease expired, job returned to queue");
    }
    for job_id in &outcome.failed {
        tracing::warn!(job_id, "lease expired past retry bound, job failed");
        propagate_failure(store, webhook, job_id, now).await;
    }
    (outcome.requeued, outcome.failed)
}

/// Session/batch bookkeeping plus the terminal webhook for a
/// reaper-failed job.
async fn propagate_failure(store: &Store, webhook: &WebhookSender, job_id: &str, now_ms: u64) {
    let job = match store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(job_id, error = %e, "failed to load reaped job");
            return;
        }
    };
    debug_assert_eq!(job.status, JobStatus::Failed);

    if let Some(session_id) = &job.session_id {
        if let Err(e) = store
            .set_session_job_status(session_id, JobStatus::Failed.as_str())
            .await
        {
            tracing::error!(job_id, session_id, error = %e, "failed to update session status");
        }
        webhook.spawn_deliver(JobUpdate {
            job_id: job.id.clone(),
            session_id: Some(session_id.clone()),
            status: JobStatus::Failed,
            reports: None,
            error: job.error_text.clone(),
            completed_at: Some(format_epoch_ms(now_ms)),
        });
    }
    if let Some(batch_id) = &job.batch_id {
        if let Err(e) = store.refresh_batch_status(batch_id, now_ms).await {
            tracing::error!(job_id, batch_id, error = %e, "failed to refresh batch status");
        }
    }
}

/// Spawn the periodic sweep; cancels cleanly with the token.
pub fn spawn_reaper(
    store: Store,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    webhook: WebhookSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(config.server.reap_interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("reaper stopped");
                    return;
                }
                _ = interval.tick() => {
                    reap_once(&store, &config, clock.as_ref(), &webhook).await;
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
