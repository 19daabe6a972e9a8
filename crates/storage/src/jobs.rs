// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue operations.
//!
//! Every transition is a single guarded UPDATE with a status predicate so
//! concurrent leasers and the reaper cannot double-claim or resurrect a
//! terminal job.

use crate::{Store, StorageError};
use pw_core::{Job, JobPayload, JobStatus};
use sqlx::FromRow;

/// Insert parameters for a new queued job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub session_id: Option<String>,
    pub project_id: String,
    pub batch_id: Option<String>,
    pub pipeline_kind: String,
    pub payload: JobPayload,
}

/// Result of one reaper sweep.
#[derive(Debug, Clone, Default)]
pub struct ReapOutcome {
    pub requeued: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    session_id: Option<String>,
    project_id: String,
    batch_id: Option<String>,
    pipeline_kind: String,
    status: String,
    worker_id: Option<String>,
    payload: String,
    retries: i64,
    error_text: Option<String>,
    lease_deadline_ms: Option<i64>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl JobRow {
    fn into_job(self) -> Result<Job, StorageError> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StorageError::Conflict(format!("unknown job status {}", self.status)))?;
        Ok(Job {
            id: self.id,
            session_id: self.session_id,
            project_id: self.project_id,
            batch_id: self.batch_id,
            pipeline_kind: self.pipeline_kind,
            status,
            worker_id: self.worker_id,
            payload: serde_json::from_str(&self.payload)?,
            retries: self.retries as u32,
            error_text: self.error_text,
            lease_deadline_ms: self.lease_deadline_ms.map(|v| v as u64),
            created_at_ms: self.created_at_ms as u64,
            updated_at_ms: self.updated_at_ms as u64,
        })
    }
}

const SELECT_JOB: &str = "SELECT id, session_id, project_id, batch_id, pipeline_kind, status, \
     worker_id, payload, retries, error_text, lease_deadline_ms, created_at_ms, updated_at_ms \
     FROM jobs";

impl Store {
    /// Insert a new job in `queued` state.
    pub async fn insert_job(&self, new: NewJob, now_ms: u64) -> Result<Job, StorageError> {
        let payload = serde_json::to_string(&new.payload)?;
        sqlx::query(
            "INSERT INTO jobs (id, session_id, project_id, batch_id, pipeline_kind, status, \
             payload, created_at_ms, updated_at_ms) \
             VALUES (?, ?, ?, ?, ?, 'queued', ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(&new.session_id)
        .bind(&new.project_id)
        .bind(&new.batch_id)
        .bind(&new.pipeline_kind)
        .bind(&payload)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .execute(self.pool())
        .await?;
        self.get_job(&new.id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {}", new.id)))
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, StorageError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("{SELECT_JOB} WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Most recent job referencing the given session, if any.
    pub async fn find_job_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Job>, StorageError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE session_id = ? ORDER BY created_at_ms DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Atomically claim up to `limit` queued jobs of one pipeline kind.
    ///
    /// Single statement with a `status = 'queued'` predicate; two
    /// concurrent leasers never receive the same job. Claimed jobs come
    /// back oldest first.
    pub async fn lease_jobs(
        &self,
        worker_id: &str,
        pipeline_kind: &str,
        limit: u32,
        now_ms: u64,
        lease_ms: u64,
    ) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "UPDATE jobs SET status = 'processing', worker_id = ?, lease_deadline_ms = ?, \
             updated_at_ms = ? \
             WHERE status = 'queued' AND id IN ( \
                 SELECT id FROM jobs WHERE status = 'queued' AND pipeline_kind = ? \
                 ORDER BY created_at_ms ASC LIMIT ?) \
             RETURNING id, session_id, project_id, batch_id, pipeline_kind, status, worker_id, \
                 payload, retries, error_text, lease_deadline_ms, created_at_ms, updated_at_ms",
        )
        .bind(worker_id)
        .bind((now_ms + lease_ms) as i64)
        .bind(now_ms as i64)
        .bind(pipeline_kind)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await?;

        let mut jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>, _>>()?;
        jobs.sort_by_key(|j| j.created_at_ms);
        Ok(jobs)
    }

    /// Extend the lease of an in-flight job (progress touch).
    pub async fn touch_lease(
        &self,
        job_id: &str,
        extend_ms: u64,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE jobs SET lease_deadline_ms = ?, updated_at_ms = ? \
             WHERE id = ? AND status = 'processing'",
        )
        .bind((now_ms + extend_ms) as i64)
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.job_transition_error(job_id).await);
        }
        Ok(())
    }

    /// Move a processing job to a terminal state.
    pub async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error_text: Option<&str>,
        now_ms: u64,
    ) -> Result<Job, StorageError> {
        debug_assert!(status.is_terminal());
        let row: Option<JobRow> = sqlx::query_as(
            "UPDATE jobs SET status = ?, error_text = ?, updated_at_ms = ?, \
             lease_deadline_ms = NULL \
             WHERE id = ? AND status = 'processing' \
             RETURNING id, session_id, project_id, batch_id, pipeline_kind, status, worker_id, \
                 payload, retries, error_text, lease_deadline_ms, created_at_ms, updated_at_ms",
        )
        .bind(status.as_str())
        .bind(error_text)
        .bind(now_ms as i64)
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        match row {
            Some(r) => r.into_job(),
            None => Err(self.job_transition_error(job_id).await),
        }
    }

    /// Return a processing job to the queue (graceful worker shutdown).
    ///
    /// Bounded by `max_retries`: beyond the bound the job fails instead.
    pub async fn requeue_job(
        &self,
        job_id: &str,
        max_retries: u32,
        now_ms: u64,
    ) -> Result<JobStatus, StorageError> {
        let job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        if job.status.is_terminal() {
            return Err(StorageError::TerminalJob(job_id.to_string()));
        }
        if job.retries + 1 >= max_retries {
            let failed = self
                .finish_job(job_id, JobStatus::Failed, Some("max retries exceeded"), now_ms)
                .await?;
            return Ok(failed.status);
        }
        let result = sqlx::query(
            "UPDATE jobs SET status = 'queued', worker_id = NULL, lease_deadline_ms = NULL, \
             retries = retries + 1, updated_at_ms = ? \
             WHERE id = ? AND status = 'processing'",
        )
        .bind(now_ms as i64)
        .bind(job_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(self.job_transition_error(job_id).await);
        }
        Ok(JobStatus::Queued)
    }

    /// One reaper sweep: expired leases go back to `queued`, jobs at the
    /// retry bound go to `failed` with a "max retries" message.
    pub async fn reap_expired(
        &self,
        now_ms: u64,
        max_retries: u32,
    ) -> Result<ReapOutcome, StorageError> {
        let mut tx = self.pool().begin().await?;

        let failed: Vec<(String,)> = sqlx::query_as(
            "UPDATE jobs SET status = 'failed', worker_id = NULL, lease_deadline_ms = NULL, \
             error_text = 'max retries exceeded', updated_at_ms = ? \
             WHERE status = 'processing' AND lease_deadline_ms < ? AND retries + 1 >= ? \
             RETURNING id",
        )
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(max_retries as i64)
        .fetch_all(&mut *tx)
        .await?;

        let requeued: Vec<(String,)> = sqlx::query_as(
            "UPDATE jobs SET status = 'queued', worker_id = NULL, lease_deadline_ms = NULL, \
             retries = retries + 1, updated_at_ms = ? \
             WHERE status = 'processing' AND lease_deadline_ms < ? \
             RETURNING id",
        )
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReapOutcome {
            requeued: requeued.into_iter().map(|(id,)| id).collect(),
            failed: failed.into_iter().map(|(id,)| id).collect(),
        })
    }

    /// Jobs filtered by optional project and status, newest first.
    pub async fn list_jobs(
        &self,
        filter_project: Option<&str>,
        filter_status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE (?1 IS NULL OR project_id = ?1) \
             AND (?2 IS NULL OR status = ?2) ORDER BY created_at_ms DESC"
        ))
        .bind(filter_project)
        .bind(filter_status.map(|s| s.as_str()))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    pub async fn jobs_for_batch(&self, batch_id: &str) -> Result<Vec<Job>, StorageError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE batch_id = ? ORDER BY created_at_ms ASC"
        ))
        .bind(batch_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Number of jobs that are not yet terminal.
    pub async fn count_active_jobs(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('queued', 'processing')",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(count as u64)
    }

    /// Distinguish a missing job from a terminal one for error reporting.
    async fn job_transition_error(&self, job_id: &str) -> StorageError {
        match self.get_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                StorageError::TerminalJob(job_id.to_string())
            }
            Ok(Some(job)) => StorageError::Conflict(format!(
                "job {job_id} is {} and cannot transition",
                job.status
            )),
            Ok(None) => StorageError::NotFound(format!("job {job_id}")),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
