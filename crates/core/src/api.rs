// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs shared by the dispatcher, the workers, and the webhook.
//!
//! Field names follow the HTTP contract (camelCase on the wire).

use crate::batch::BatchStatus;
use crate::job::{Job, JobProgress, JobStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `POST /internal/jobs` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub session_id: String,
    pub project_id: String,
}

/// `POST /internal/jobs` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// One leased job as handed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeasedJob {
    pub job_id: String,
    pub session_id: Option<String>,
    pub project_id: String,
    pub batch_id: Option<String>,
    pub pipeline_kind: String,
    pub payload: crate::job::JobPayload,
    pub lease_deadline_ms: u64,
}

impl LeasedJob {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            session_id: job.session_id.clone(),
            project_id: job.project_id.clone(),
            batch_id: job.batch_id.clone(),
            pipeline_kind: job.pipeline_kind.clone(),
            payload: job.payload.clone(),
            lease_deadline_ms: job.lease_deadline_ms.unwrap_or_default(),
        }
    }
}

/// `GET /external/jobs` (lease) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub jobs: Vec<LeasedJob>,
}

/// Progress or terminal update for a job.
///
/// The same shape travels worker→dispatcher (`PATCH /external/jobs/{id}`)
/// and dispatcher→front-end (webhook).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: JobStatus,
    /// Canonical report name → textual content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Acknowledgement for job updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAck {
    pub status: JobStatus,
}

/// `GET /internal/jobs/{sessionId}` poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One active job with computed progress, for admin/batch listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: String,
    pub session_id: Option<String>,
    pub project_id: String,
    pub batch_id: Option<String>,
    pub pipeline_kind: String,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub retries: u32,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /admin/jobs/{id}/progress` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPage {
    pub lines: Vec<String>,
    pub total: usize,
}

/// Per-kind worker pool configuration, admin-editable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    pub instances: u32,
    pub poll_interval_ms: u64,
    pub max_concurrent_jobs: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            instances: 1,
            poll_interval_ms: 5_000,
            max_concurrent_jobs: 1,
        }
    }
}

/// `GET/PUT /admin/settings` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    pub kinds: BTreeMap<String, WorkerSettings>,
    /// True when active jobs exist, so a drain-and-restart is required
    /// before new settings take effect.
    #[serde(default)]
    pub restart_pending: bool,
}

/// One input document in a batch upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub name: String,
    pub content: String,
}

/// `POST /internal/batches` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest {
    pub project_id: String,
    pub name: String,
    pub files: Vec<BatchFile>,
}

/// `POST /internal/batches` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateResponse {
    pub batch_id: String,
    pub total_jobs: u32,
}

/// `GET /internal/batches/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub per_job: Vec<ActiveJob>,
}

/// Error body returned by the API surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_in_secs: Option<u64>,
}
