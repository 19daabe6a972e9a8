// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin-editable worker pool settings.

use crate::{Store, StorageError};
use pw_core::api::WorkerSettings;
use sqlx::FromRow;
use std::collections::BTreeMap;

#[derive(Debug, FromRow)]
struct SettingsRow {
    kind: String,
    instances: i64,
    poll_interval_ms: i64,
    max_concurrent_jobs: i64,
}

impl Store {
    pub async fn get_worker_settings(
        &self,
    ) -> Result<BTreeMap<String, WorkerSettings>, StorageError> {
        let rows: Vec<SettingsRow> = sqlx::query_as(
            "SELECT kind, instances, poll_interval_ms, max_concurrent_jobs \
             FROM worker_settings ORDER BY kind ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.kind,
                    WorkerSettings {
                        instances: r.instances as u32,
                        poll_interval_ms: r.poll_interval_ms as u64,
                        max_concurrent_jobs: r.max_concurrent_jobs as u32,
                    },
                )
            })
            .collect())
    }

    pub async fn put_worker_settings(
        &self,
        kinds: &BTreeMap<String, WorkerSettings>,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await?;
        for (kind, settings) in kinds {
            sqlx::query(
                "INSERT INTO worker_settings (kind, instances, poll_interval_ms, \
                 max_concurrent_jobs, updated_at_ms) VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT (kind) DO UPDATE SET instances = excluded.instances, \
                 poll_interval_ms = excluded.poll_interval_ms, \
                 max_concurrent_jobs = excluded.max_concurrent_jobs, \
                 updated_at_ms = excluded.updated_at_ms",
            )
            .bind(kind)
            .bind(settings.instances as i64)
            .bind(settings.poll_interval_ms as i64)
            .bind(settings.max_concurrent_jobs as i64)
            .bind(now_ms as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
