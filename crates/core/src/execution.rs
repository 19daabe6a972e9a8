// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution instance and per-node log entities.

use crate::project::VarValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status of one concrete run of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// One concrete run of a project for a job.
///
/// Created the instant the executor begins; mutated exactly twice
/// (creation with `running`, then finalize). Owns its logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInstance {
    pub id: String,
    pub project_id: String,
    pub job_id: Option<String>,
    pub session_id: Option<String>,
    pub status: ExecutionStatus,
    pub total_nodes: u32,
    pub executed_nodes: u32,
    pub failed_nodes: u32,
    pub skipped_nodes: u32,
    pub current_node_id: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Merged variable environment frozen before scheduling.
    pub global_variables_snapshot: BTreeMap<String, VarValue>,
    /// Per-node outputs keyed by node id.
    pub execution_results: Value,
}

/// Terminal status of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLogStatus {
    Completed,
    Failed,
}

impl ExecutionLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionLogStatus::Completed => "completed",
            ExecutionLogStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ExecutionLogStatus::Completed),
            "failed" => Some(ExecutionLogStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only record of one node evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: String,
    pub execution_instance_id: String,
    pub node_id: String,
    pub status: ExecutionLogStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at_ms: u64,
}

/// Log entry before persistence assigns an id.
#[derive(Debug, Clone)]
pub struct NewExecutionLog {
    pub execution_instance_id: String,
    pub node_id: String,
    pub status: ExecutionLogStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}
