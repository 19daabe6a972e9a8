// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives one leased job through the executor and reports the outcome.

use crate::client::DispatchApi;
use pw_core::api::{JobUpdate, LeasedJob};
use pw_core::{Clock, Config, ExecutionStatus, JobStatus, CANONICAL_REPORT_NAMES};
use pw_engine::{DagExecutor, EngineError, RunOutcome, RunRequest};
use pw_storage::Store;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct JobRunner {
    store: Store,
    executor: Arc<DagExecutor>,
    client: Arc<dyn DispatchApi>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(
        store: Store,
        executor: Arc<DagExecutor>,
        client: Arc<dyn DispatchApi>,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            executor,
            client,
            config,
            clock,
        }
    }

    /// Lease-renewal cadence: well inside the renewal window.
    fn renewal_interval(&self) -> Duration {
        Duration::from_millis((self.config.lease.renew_ms() / 5).max(100))
    }

    /// Run one leased job end to end. Always reports a final state unless
    /// the dispatcher is unreachable.
    pub async fn run_job(&self, leased: &LeasedJob, cancel: &CancellationToken) {
        tracing::info!(
            job_id = leased.job_id,
            project_id = leased.project_id,
            kind = leased.pipeline_kind,
            "job started"
        );

        let request = match self.load_request(leased).await {
            Ok(request) => request,
            Err(message) => {
                // Structural problems are reported failed without retry.
                self.report_terminal(leased, JobStatus::Failed, None, Some(message))
                    .await;
                return;
            }
        };

        // Keep the lease alive while the run is in flight.
        let renewal = self.spawn_renewal(leased.job_id.clone());

        let outcome = self.executor.run(request, cancel).await;
        renewal.cancel();

        match outcome {
            Ok(outcome) if outcome.cancelled => {
                // Graceful shutdown: give the job back to the queue.
                tracing::info!(job_id = leased.job_id, "run cancelled, returning job to queue");
                self.report_status(leased, JobStatus::Queued, None, None).await;
            }
            Ok(outcome) => {
                let failed = outcome.failed;
                match outcome.status {
                    ExecutionStatus::Completed => {
                        let reports = extract_reports(&outcome);
                        self.report_terminal(leased, JobStatus::Completed, reports, None)
                            .await;
                    }
                    _ => {
                        self.report_terminal(
                            leased,
                            JobStatus::Failed,
                            None,
                            Some(format!("{failed} node(s) failed")),
                        )
                        .await;
                    }
                }
            }
            Err(EngineError::InvalidGraph(message))
            | Err(EngineError::UnknownNodeKind(message)) => {
                self.report_terminal(leased, JobStatus::Failed, None, Some(message))
                    .await;
            }
            Err(e) => {
                self.report_terminal(leased, JobStatus::Failed, None, Some(e.to_string()))
                    .await;
            }
        }
    }

    async fn load_request(&self, leased: &LeasedJob) -> Result<RunRequest, String> {
        let project = self
            .store
            .get_project(&leased.project_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("project {} not found", leased.project_id))?;

        Ok(RunRequest {
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            job_id: Some(leased.job_id.clone()),
            session_id: leased.session_id.clone(),
            nodes: project.canvas.nodes,
            edges: project.canvas.edges,
            initial_variables: leased.payload.initial_variables.clone(),
            clear_results: true,
        })
    }

    fn spawn_renewal(&self, job_id: String) -> CancellationToken {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let client = Arc::clone(&self.client);
        let interval = self.renewal_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick is a no-op
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let touch = JobUpdate {
                    job_id: job_id.clone(),
                    session_id: None,
                    status: JobStatus::Processing,
                    reports: None,
                    error: None,
                    completed_at: None,
                };
                match client.report(&job_id, &touch).await {
                    Ok(_) => tracing::debug!(job_id, "lease renewed"),
                    Err(e) if e.is_terminal_conflict() => {
                        tracing::warn!(job_id, "job went terminal underneath the renewal task");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(job_id, error = %e, "lease renewal failed");
                    }
                }
            }
        });
        stop
    }

    async fn report_terminal(
        &self,
        leased: &LeasedJob,
        status: JobStatus,
        reports: Option<BTreeMap<String, String>>,
        error: Option<String>,
    ) {
        if status == JobStatus::Failed {
            tracing::warn!(job_id = leased.job_id, error = ?error, "job failed");
        } else {
            tracing::info!(job_id = leased.job_id, "job completed");
        }
        self.report_status(leased, status, reports, error).await;
    }

    async fn report_status(
        &self,
        leased: &LeasedJob,
        status: JobStatus,
        reports: Option<BTreeMap<String, String>>,
        error: Option<String>,
    ) {
        let update = JobUpdate {
            job_id: leased.job_id.clone(),
            session_id: leased.session_id.clone(),
            status,
            reports,
            error,
            completed_at: Some(pw_core::format_epoch_ms(self.clock.epoch_ms())),
        };
        match self.client.report(&leased.job_id, &update).await {
            Ok(_) => {}
            Err(e) if e.is_terminal_conflict() => {
                tracing::warn!(job_id = leased.job_id, "job already terminal on dispatcher");
            }
            Err(e) => {
                // The reaper reclaims the lease if this never lands.
                tracing::error!(job_id = leased.job_id, error = %e, "failed to report job state");
            }
        }
    }
}

/// Pull the three canonical report texts out of the final variables.
fn extract_reports(outcome: &RunOutcome) -> Option<BTreeMap<String, String>> {
    let mut reports = BTreeMap::new();
    for name in CANONICAL_REPORT_NAMES {
        if let Some(content) = outcome.variables.get(name) {
            reports.insert(name.to_string(), content.clone());
        }
    }
    if reports.is_empty() {
        None
    } else {
        Some(reports)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
