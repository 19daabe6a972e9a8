// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job dispatcher: enqueue, lease, progress, terminal handling.

use crate::webhook::WebhookSender;
use pw_core::api::{ActiveJob, JobUpdate, LeasedJob, PollResponse, UpdateAck};
use pw_core::{
    format_epoch_ms, Clock, Config, ErrorKind, Job, JobId, JobPayload, JobProgress, JobStatus,
    ReportType, Session, SessionStatus, VarValue,
};
use pw_storage::{NewJob, Store};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum jobs handed out per lease call.
pub const MAX_LEASE_BATCH: u32 = 10;

#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    webhook: WebhookSender,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        webhook: WebhookSender,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            webhook,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Queue a job for a sealed session.
    ///
    /// Idempotent while a job is live: a queued/processing job is returned
    /// as-is. A completed job is a conflict; a failed one may be retried
    /// with a fresh job.
    pub async fn enqueue(&self, session_id: &str, project_id: &str) -> Result<Job, ErrorKind> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| e.kind())?
            .ok_or_else(|| ErrorKind::NotFound(format!("session {session_id}")))?;
        if session.status != SessionStatus::Completed {
            return Err(ErrorKind::BadRequest(format!(
                "session {session_id} is {} and cannot be queued",
                session.status.as_str()
            )));
        }

        if let Some(existing) = self
            .store
            .find_job_by_session(session_id)
            .await
            .map_err(|e| e.kind())?
        {
            match existing.status {
                JobStatus::Queued | JobStatus::Processing => return Ok(existing),
                JobStatus::Completed => {
                    return Err(ErrorKind::Conflict(format!(
                        "session {session_id} already has a completed job {}",
                        existing.id
                    )))
                }
                JobStatus::Failed => {}
            }
        }

        let project = self
            .store
            .get_project(project_id)
            .await
            .map_err(|e| e.kind())?
            .ok_or_else(|| ErrorKind::NotFound(format!("project {project_id}")))?;

        let now = self.clock.epoch_ms();
        let job = self
            .store
            .insert_job(
                NewJob {
                    id: JobId::generate().to_string(),
                    session_id: Some(session_id.to_string()),
                    project_id: project_id.to_string(),
                    batch_id: None,
                    pipeline_kind: project.pipeline_kind().to_string(),
                    payload: self.session_payload(&session).await?,
                },
                now,
            )
            .await
            .map_err(|e| e.kind())?;

        self.store
            .set_session_job(session_id, &job.id, JobStatus::Queued.as_str())
            .await
            .map_err(|e| e.kind())?;

        tracing::info!(
            job_id = job.id,
            session_id,
            project_id,
            kind = job.pipeline_kind,
            "job enqueued"
        );
        Ok(job)
    }

    /// Initial variables derived from the sealed session's answers.
    async fn session_payload(&self, session: &Session) -> Result<JobPayload, ErrorKind> {
        let responses = self
            .store
            .list_responses(&session.id)
            .await
            .map_err(|e| e.kind())?;

        let answers_json = serde_json::to_string(
            &responses
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "questionId": r.question_id,
                        "questionText": r.question_text,
                        "answer": r.answer,
                    })
                })
                .collect::<Vec<_>>(),
        )
        .map_err(|e| ErrorKind::Internal(e.to_string()))?;

        let input_text = responses
            .iter()
            .map(|r| format!("Q{}: {}\nA: {}", r.question_id, r.question_text, r.answer))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut initial_variables = BTreeMap::new();
        initial_variables.insert("session_id".to_string(), VarValue::new(session.id.clone()));
        initial_variables.insert("responses".to_string(), VarValue::new(answers_json));
        initial_variables.insert("input_text".to_string(), VarValue::new(input_text));
        Ok(JobPayload { initial_variables })
    }

    /// Atomically lease up to `batch` queued jobs of one kind.
    pub async fn lease(
        &self,
        worker_id: &str,
        pipeline_kind: &str,
        batch: u32,
    ) -> Result<Vec<LeasedJob>, ErrorKind> {
        let batch = batch.clamp(1, MAX_LEASE_BATCH);
        let now = self.clock.epoch_ms();
        let jobs = self
            .store
            .lease_jobs(
                worker_id,
                pipeline_kind,
                batch,
                now,
                self.config.lease.initial_ms(),
            )
            .await
            .map_err(|e| e.kind())?;
        if !jobs.is_empty() {
            tracing::info!(
                worker_id,
                kind = pipeline_kind,
                count = jobs.len(),
                "jobs leased"
            );
        }
        Ok(jobs.iter().map(LeasedJob::from_job).collect())
    }

    /// Progress or terminal update from a worker (or external integrator).
    pub async fn report(&self, job_id: &str, update: JobUpdate) -> Result<UpdateAck, ErrorKind> {
        let now = self.clock.epoch_ms();
        match update.status {
            JobStatus::Processing => {
                // Progress touch extends the lease.
                self.store
                    .touch_lease(job_id, self.config.lease.renew_ms(), now)
                    .await
                    .map_err(|e| e.kind())?;
                Ok(UpdateAck {
                    status: JobStatus::Processing,
                })
            }
            JobStatus::Queued => {
                // Cooperative give-back (graceful worker shutdown).
                let status = self
                    .store
                    .requeue_job(job_id, self.config.lease.max_retries, now)
                    .await
                    .map_err(|e| e.kind())?;
                if status == JobStatus::Failed {
                    self.after_terminal(job_id, None).await?;
                }
                Ok(UpdateAck { status })
            }
            JobStatus::Completed => {
                let job = self
                    .store
                    .finish_job(job_id, JobStatus::Completed, None, now)
                    .await
                    .map_err(|e| e.kind())?;
                self.after_terminal(job_id, Some((&job, &update))).await?;
                Ok(UpdateAck {
                    status: JobStatus::Completed,
                })
            }
            JobStatus::Failed => {
                let error = update.error.as_deref().unwrap_or("job failed");
                let job = self
                    .store
                    .finish_job(job_id, JobStatus::Failed, Some(error), now)
                    .await
                    .map_err(|e| e.kind())?;
                self.after_terminal(job_id, Some((&job, &update))).await?;
                Ok(UpdateAck {
                    status: JobStatus::Failed,
                })
            }
        }
    }

    /// Post-terminal bookkeeping: reports, session back-reference, batch
    /// counters, webhook forwarding.
    async fn after_terminal(
        &self,
        job_id: &str,
        context: Option<(&Job, &JobUpdate)>,
    ) -> Result<(), ErrorKind> {
        let job = match context {
            Some((job, _)) => job.clone(),
            None => self
                .store
                .get_job(job_id)
                .await
                .map_err(|e| e.kind())?
                .ok_or_else(|| ErrorKind::NotFound(format!("job {job_id}")))?,
        };
        let update = context.map(|(_, u)| u);
        let now = self.clock.epoch_ms();

        if let Some(session_id) = &job.session_id {
            if job.status == JobStatus::Completed {
                if let Some(reports) = update.and_then(|u| u.reports.as_ref()) {
                    self.persist_reports(session_id, reports, now).await?;
                }
            }
            self.store
                .set_session_job_status(session_id, job.status.as_str())
                .await
                .map_err(|e| e.kind())?;

            self.webhook.spawn_deliver(JobUpdate {
                job_id: job.id.clone(),
                session_id: Some(session_id.clone()),
                status: job.status,
                reports: update.and_then(|u| u.reports.clone()),
                error: job.error_text.clone(),
                completed_at: Some(format_epoch_ms(now)),
            });
        }

        if let Some(batch_id) = &job.batch_id {
            self.store
                .refresh_batch_status(batch_id, now)
                .await
                .map_err(|e| e.kind())?;
        }
        Ok(())
    }

    /// Delete-then-insert the session's reports under the canonical name
    /// mapping. Unknown names are dropped with a warning.
    async fn persist_reports(
        &self,
        session_id: &str,
        reports: &BTreeMap<String, String>,
        now_ms: u64,
    ) -> Result<(), ErrorKind> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| e.kind())?;
        let user_id = session.and_then(|s| s.user_id);

        let mut rows = Vec::new();
        for (name, content) in reports {
            match ReportType::from_report_name(name) {
                Some(report_type) => rows.push((
                    report_type,
                    report_type.default_visibility(),
                    content.clone(),
                )),
                None => tracing::warn!(session_id, name, "dropping unrecognized report name"),
            }
        }

        self.store
            .replace_reports(
                session_id,
                user_id.as_deref(),
                &rows,
                &format_epoch_ms(now_ms),
            )
            .await
            .map_err(|e| e.kind())?;
        Ok(())
    }

    /// Current job state for a session, with reports once completed.
    pub async fn poll(&self, session_id: &str) -> Result<PollResponse, ErrorKind> {
        let job = self
            .store
            .find_job_by_session(session_id)
            .await
            .map_err(|e| e.kind())?
            .ok_or_else(|| ErrorKind::NotFound(format!("no job for session {session_id}")))?;

        let reports = if job.status == JobStatus::Completed {
            let stored = self
                .store
                .list_reports(session_id)
                .await
                .map_err(|e| e.kind())?;
            let mut by_name = BTreeMap::new();
            for report in stored {
                let name = match report.report_type {
                    ReportType::Adapted => "Adapted Report",
                    ReportType::Full => "Professional Report",
                    ReportType::ScoreTable => "Aggregate Score Profile",
                };
                by_name.insert(name.to_string(), report.content);
            }
            Some(by_name)
        } else {
            None
        };

        Ok(PollResponse {
            job_id: job.id,
            status: job.status,
            reports,
            error: job.error_text,
        })
    }

    /// Jobs with live progress computed from the latest execution instance.
    pub async fn list_active(
        &self,
        filter_project: Option<&str>,
        filter_status: Option<JobStatus>,
    ) -> Result<Vec<ActiveJob>, ErrorKind> {
        let jobs = self
            .store
            .list_jobs(filter_project, filter_status)
            .await
            .map_err(|e| e.kind())?;
        let mut active = Vec::with_capacity(jobs.len());
        for job in jobs {
            active.push(self.as_active(job).await?);
        }
        Ok(active)
    }

    pub async fn as_active(&self, job: Job) -> Result<ActiveJob, ErrorKind> {
        let progress = self
            .store
            .latest_execution_for_job(&job.id)
            .await
            .map_err(|e| e.kind())?
            .map(|instance| JobProgress {
                total_nodes: instance.total_nodes,
                executed_nodes: instance.executed_nodes,
                failed_nodes: instance.failed_nodes,
                percentage: JobProgress::percent_of(
                    instance.executed_nodes + instance.failed_nodes,
                    instance.total_nodes,
                ),
                current_node_id: instance.current_node_id,
            });
        Ok(ActiveJob {
            job_id: job.id,
            session_id: job.session_id,
            project_id: job.project_id,
            batch_id: job.batch_id,
            pipeline_kind: job.pipeline_kind,
            status: job.status,
            worker_id: job.worker_id,
            retries: job.retries,
            created_at_ms: job.created_at_ms,
            progress,
            error: job.error_text,
        })
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
