// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface (axum).
//!
//! Route groups mirror the callers: `/internal` for the front-end,
//! `/external` for workers and integrators, `/admin` for operators.
//! Every state-changing endpoint requires the shared-secret header.

use crate::batch;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use pw_core::api::{
    BatchCreateRequest, BatchCreateResponse, BatchStatusResponse, EnqueueRequest, EnqueueResponse,
    JobUpdate, LeaseResponse, PollResponse, ProgressPage, SettingsPayload, UpdateAck,
};
use pw_core::{ErrorKind, JobStatus};
use serde::Deserialize;
use std::sync::atomic::Ordering;
use tower_http::trace::TraceLayer;

/// Shared secret header checked on every request.
const SECRET_HEADER: &str = "x-backend-secret";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/internal/jobs", post(enqueue))
        .route("/internal/jobs/:session_id", get(poll))
        .route("/internal/batches", post(create_batch))
        .route("/internal/batches/:batch_id", get(batch_status))
        .route("/external/jobs", get(lease))
        .route("/external/jobs/:job_id", patch(report))
        .route("/admin/jobs", get(list_jobs))
        .route("/admin/jobs/:job_id/progress", get(progress))
        .route("/admin/settings", get(get_settings).put(put_settings))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_secret,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests without the shared secret (when one is configured).
async fn require_secret(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = &state.config.server.backend_secret;
    if !expected.is_empty() {
        let presented = request
            .headers()
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(ApiError(ErrorKind::Unauthorized));
        }
    }
    Ok(next.run(request).await)
}

async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let job = state
        .dispatcher
        .enqueue(&request.session_id, &request.project_id)
        .await?;
    Ok(Json(EnqueueResponse {
        job_id: job.id,
        status: job.status,
    }))
}

async fn poll(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PollResponse>, ApiError> {
    Ok(Json(state.dispatcher.poll(&session_id).await?))
}

#[derive(Debug, Deserialize)]
struct LeaseQuery {
    #[serde(default)]
    status: Option<String>,
    kind: String,
    #[serde(default)]
    batch: Option<u32>,
    worker: String,
}

async fn lease(
    State(state): State<AppState>,
    Query(query): Query<LeaseQuery>,
) -> Result<Json<LeaseResponse>, ApiError> {
    if let Some(status) = &query.status {
        if status != "queued" {
            return Err(ApiError(ErrorKind::BadRequest(format!(
                "only queued jobs can be leased, got status={status}"
            ))));
        }
    }
    let jobs = state
        .dispatcher
        .lease(&query.worker, &query.kind, query.batch.unwrap_or(1))
        .await?;
    Ok(Json(LeaseResponse { jobs }))
}

async fn report(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(update): Json<JobUpdate>,
) -> Result<Json<UpdateAck>, ApiError> {
    Ok(Json(state.dispatcher.report(&job_id, update).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default)]
    filter_project: Option<String>,
    #[serde(default)]
    filter_status: Option<String>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<pw_core::api::ActiveJob>>, ApiError> {
    let status = match &query.filter_status {
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| {
            ApiError(ErrorKind::BadRequest(format!("unknown status {raw}")))
        })?),
        None => None,
    };
    let jobs = state
        .dispatcher
        .list_active(query.filter_project.as_deref(), status)
        .await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    offset: usize,
}

async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressPage>, ApiError> {
    let page = pw_engine::read_progress(&state.config.progress.log_dir, &job_id, query.offset);
    Ok(Json(page))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<SettingsPayload>, ApiError> {
    let kinds = state.store.get_worker_settings().await?;
    Ok(Json(SettingsPayload {
        kinds,
        restart_pending: state.settings_pending.load(Ordering::SeqCst),
    }))
}

async fn put_settings(
    State(state): State<AppState>,
    Json(payload): Json<SettingsPayload>,
) -> Result<(StatusCode, Json<SettingsPayload>), ApiError> {
    state
        .store
        .put_worker_settings(&payload.kinds, state.clock.epoch_ms())
        .await?;

    // Settings take effect on worker restart; flag when jobs are active.
    let active = state.store.count_active_jobs().await?;
    let restart_pending = active > 0;
    state
        .settings_pending
        .store(restart_pending, Ordering::SeqCst);
    if restart_pending {
        tracing::info!(active, "settings updated; drain and restart workers to apply");
    }

    Ok((
        StatusCode::OK,
        Json(SettingsPayload {
            kinds: payload.kinds,
            restart_pending,
        }),
    ))
}

async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchCreateRequest>,
) -> Result<Json<BatchCreateResponse>, ApiError> {
    let response = batch::create_batch(
        &state.store,
        &state.config,
        state.clock.as_ref(),
        request,
    )
    .await?;
    Ok(Json(response))
}

async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchStatusResponse>, ApiError> {
    let response = batch::batch_status(
        &state.store,
        &state.dispatcher,
        state.clock.as_ref(),
        &batch_id,
    )
    .await?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
