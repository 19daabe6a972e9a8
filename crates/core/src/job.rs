// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job entity and state machine.
//!
//! A job ties a session (or a batch input) to a project and is leased to
//! exactly one worker at a time. Status moves strictly forward:
//! `queued → processing → {completed | failed}`; the reaper may move an
//! expired `processing` lease back to `queued`.

use crate::project::VarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque work description carried from enqueue to execution.
///
/// The executor merges `initial_variables` over the project's stored
/// globals before scheduling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub initial_variables: BTreeMap<String, VarValue>,
}

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub session_id: Option<String>,
    pub project_id: String,
    pub batch_id: Option<String>,
    /// Coarse routing category; workers lease only their own kind.
    pub pipeline_kind: String,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    #[serde(default)]
    pub payload: JobPayload,
    /// Times the reaper has returned this job to the queue.
    #[serde(default)]
    pub retries: u32,
    pub error_text: Option<String>,
    pub lease_deadline_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Job {
    /// True when the lease has expired relative to `now_ms`.
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        self.status == JobStatus::Processing
            && self.lease_deadline_ms.map(|d| d < now_ms).unwrap_or(false)
    }
}

/// Live progress computed from the most recent running execution instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total_nodes: u32,
    pub executed_nodes: u32,
    pub failed_nodes: u32,
    pub percentage: u32,
    pub current_node_id: Option<String>,
}

impl JobProgress {
    pub fn percent_of(done: u32, total: u32) -> u32 {
        if total == 0 {
            0
        } else {
            done * 100 / total
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
