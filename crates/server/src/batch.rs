// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch coordinator: one folder of texts, N sibling jobs.

use crate::dispatch::Dispatcher;
use pw_core::api::{BatchCreateRequest, BatchCreateResponse, BatchStatusResponse};
use pw_core::{Batch, BatchId, BatchStatus, Clock, Config, ErrorKind, JobId, JobPayload, VarValue};
use pw_storage::{NewJob, Store};
use std::collections::BTreeMap;

/// File name without its last extension.
fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Fan a folder of input documents into sibling jobs sharing one batch id.
pub async fn create_batch(
    store: &Store,
    config: &Config,
    clock: &dyn Clock,
    request: BatchCreateRequest,
) -> Result<BatchCreateResponse, ErrorKind> {
    if request.files.is_empty() {
        return Err(ErrorKind::BadRequest("batch has no files".to_string()));
    }
    let project = store
        .get_project(&request.project_id)
        .await
        .map_err(|e| e.kind())?
        .ok_or_else(|| ErrorKind::NotFound(format!("project {}", request.project_id)))?;
    let pipeline_kind = project.pipeline_kind().to_string();

    let batch_id = BatchId::generate().to_string();
    let now = clock.epoch_ms();
    let base = config.server.batch_output_dir.display().to_string();
    let total_jobs = request.files.len() as u32;

    store
        .insert_batch(&Batch {
            id: batch_id.clone(),
            project_id: request.project_id.clone(),
            name: request.name.clone(),
            output_dir: format!("{base}/{batch_id}"),
            status: BatchStatus::Queued,
            total_jobs,
            completed_jobs: 0,
            failed_jobs: 0,
            created_at_ms: now,
            completed_at_ms: None,
        })
        .await
        .map_err(|e| e.kind())?;

    for file in &request.files {
        let mut initial_variables = BTreeMap::new();
        initial_variables.insert("input_text".to_string(), VarValue::new(file.content.clone()));
        initial_variables.insert("source_name".to_string(), VarValue::new(file.name.clone()));
        initial_variables.insert("batch_id".to_string(), VarValue::new(batch_id.clone()));
        initial_variables.insert(
            "output_dir".to_string(),
            VarValue::new(format!("{base}/{batch_id}/{}/", stem(&file.name))),
        );

        store
            .insert_job(
                NewJob {
                    id: JobId::generate().to_string(),
                    session_id: None,
                    project_id: request.project_id.clone(),
                    batch_id: Some(batch_id.clone()),
                    pipeline_kind: pipeline_kind.clone(),
                    payload: JobPayload { initial_variables },
                },
                now,
            )
            .await
            .map_err(|e| e.kind())?;
    }

    tracing::info!(
        batch_id,
        project_id = request.project_id,
        total_jobs,
        "batch created"
    );
    Ok(BatchCreateResponse {
        batch_id,
        total_jobs,
    })
}

/// Aggregate counters plus per-job progress.
pub async fn batch_status(
    store: &Store,
    dispatcher: &Dispatcher,
    clock: &dyn Clock,
    batch_id: &str,
) -> Result<BatchStatusResponse, ErrorKind> {
    let batch = store
        .refresh_batch_status(batch_id, clock.epoch_ms())
        .await
        .map_err(|e| e.kind())?;

    let jobs = store.jobs_for_batch(batch_id).await.map_err(|e| e.kind())?;
    let mut per_job = Vec::with_capacity(jobs.len());
    for job in jobs {
        per_job.push(dispatcher.as_active(job).await?);
    }

    Ok(BatchStatusResponse {
        batch_id: batch.id,
        status: batch.status,
        total_jobs: batch.total_jobs,
        completed_jobs: batch.completed_jobs,
        failed_jobs: batch.failed_jobs,
        per_job,
    })
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
