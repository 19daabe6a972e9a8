// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch persistence and derived-status refresh.

use crate::{Store, StorageError};
use pw_core::{derive_batch_status, Batch, BatchStatus};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
struct BatchRow {
    id: String,
    project_id: String,
    name: String,
    output_dir: String,
    status: String,
    total_jobs: i64,
    completed_jobs: i64,
    failed_jobs: i64,
    created_at_ms: i64,
    completed_at_ms: Option<i64>,
}

impl BatchRow {
    fn into_batch(self) -> Result<Batch, StorageError> {
        let status = BatchStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Conflict(format!("unknown batch status {}", self.status))
        })?;
        Ok(Batch {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            output_dir: self.output_dir,
            status,
            total_jobs: self.total_jobs as u32,
            completed_jobs: self.completed_jobs as u32,
            failed_jobs: self.failed_jobs as u32,
            created_at_ms: self.created_at_ms as u64,
            completed_at_ms: self.completed_at_ms.map(|v| v as u64),
        })
    }
}

const SELECT_BATCH: &str = "SELECT id, project_id, name, output_dir, status, total_jobs, \
     completed_jobs, failed_jobs, created_at_ms, completed_at_ms FROM batches";

impl Store {
    pub async fn insert_batch(&self, batch: &Batch) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO batches (id, project_id, name, output_dir, status, total_jobs, \
             completed_jobs, failed_jobs, created_at_ms, completed_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&batch.id)
        .bind(&batch.project_id)
        .bind(&batch.name)
        .bind(&batch.output_dir)
        .bind(batch.status.as_str())
        .bind(batch.total_jobs as i64)
        .bind(batch.completed_jobs as i64)
        .bind(batch.failed_jobs as i64)
        .bind(batch.created_at_ms as i64)
        .bind(batch.completed_at_ms.map(|v| v as i64))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_batch(&self, id: &str) -> Result<Option<Batch>, StorageError> {
        let row: Option<BatchRow> = sqlx::query_as(&format!("{SELECT_BATCH} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(BatchRow::into_batch).transpose()
    }

    /// Recompute counters and derived status from the sibling jobs.
    ///
    /// Stamps `completed_at_ms` the first time the batch turns terminal.
    pub async fn refresh_batch_status(
        &self,
        batch_id: &str,
        now_ms: u64,
    ) -> Result<Batch, StorageError> {
        let jobs = self.jobs_for_batch(batch_id).await?;
        let statuses: Vec<_> = jobs.iter().map(|j| j.status).collect();
        let status = derive_batch_status(&statuses);
        let completed = statuses
            .iter()
            .filter(|s| **s == pw_core::JobStatus::Completed)
            .count() as i64;
        let failed = statuses
            .iter()
            .filter(|s| **s == pw_core::JobStatus::Failed)
            .count() as i64;
        let terminal = matches!(
            status,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Partial
        );

        let row: Option<BatchRow> = sqlx::query_as(
            "UPDATE batches SET status = ?, completed_jobs = ?, failed_jobs = ?, \
             completed_at_ms = CASE WHEN ? AND completed_at_ms IS NULL THEN ? \
             ELSE completed_at_ms END \
             WHERE id = ? \
             RETURNING id, project_id, name, output_dir, status, total_jobs, completed_jobs, \
                 failed_jobs, created_at_ms, completed_at_ms",
        )
        .bind(status.as_str())
        .bind(completed)
        .bind(failed)
        .bind(terminal)
        .bind(now_ms as i64)
        .bind(batch_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(BatchRow::into_batch)
            .transpose()?
            .ok_or_else(|| StorageError::NotFound(format!("batch {batch_id}")))
    }
}

#[cfg(test)]
#[path = "batches_tests.rs"]
mod tests;
