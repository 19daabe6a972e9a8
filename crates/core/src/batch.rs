// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch entity and derived status.

use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate status over a batch's sibling jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Partial,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(BatchStatus::Queued),
            "processing" => Some(BatchStatus::Processing),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            "partial" => Some(BatchStatus::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A folder-upload batch owning N sibling jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub output_dir: String,
    pub status: BatchStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

/// Derive the aggregate status from the sibling jobs' statuses.
///
/// `queued` while nothing has started; `processing` while any job is still
/// live; once all jobs are terminal: `completed` with zero failures,
/// `partial` with a mix, `failed` when nothing completed.
pub fn derive_batch_status(statuses: &[JobStatus]) -> BatchStatus {
    if statuses.is_empty() || statuses.iter().all(|s| *s == JobStatus::Queued) {
        return BatchStatus::Queued;
    }
    if statuses.iter().any(|s| !s.is_terminal()) {
        return BatchStatus::Processing;
    }
    let completed = statuses.iter().filter(|s| **s == JobStatus::Completed).count();
    let failed = statuses.iter().filter(|s| **s == JobStatus::Failed).count();
    if failed == 0 {
        BatchStatus::Completed
    } else if completed > 0 {
        BatchStatus::Partial
    } else {
        BatchStatus::Failed
    }
}
