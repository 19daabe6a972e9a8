// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution instance and log persistence.
//!
//! Instances are written exactly twice: once at creation (`running`) and
//! once at finalize. Logs are append-only within a run.

use crate::{Store, StorageError};
use pw_core::{
    ExecutionInstance, ExecutionLog, ExecutionLogStatus, ExecutionStatus, NewExecutionLog,
};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct InstanceRow {
    id: String,
    project_id: String,
    job_id: Option<String>,
    session_id: Option<String>,
    status: String,
    total_nodes: i64,
    executed_nodes: i64,
    failed_nodes: i64,
    skipped_nodes: i64,
    current_node_id: Option<String>,
    started_at_ms: i64,
    completed_at_ms: Option<i64>,
    duration_ms: Option<i64>,
    global_variables_snapshot: String,
    execution_results: String,
}

impl InstanceRow {
    fn into_instance(self) -> Result<ExecutionInstance, StorageError> {
        let status = ExecutionStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Conflict(format!("unknown execution status {}", self.status))
        })?;
        Ok(ExecutionInstance {
            id: self.id,
            project_id: self.project_id,
            job_id: self.job_id,
            session_id: self.session_id,
            status,
            total_nodes: self.total_nodes as u32,
            executed_nodes: self.executed_nodes as u32,
            failed_nodes: self.failed_nodes as u32,
            skipped_nodes: self.skipped_nodes as u32,
            current_node_id: self.current_node_id,
            started_at_ms: self.started_at_ms as u64,
            completed_at_ms: self.completed_at_ms.map(|v| v as u64),
            duration_ms: self.duration_ms.map(|v| v as u64),
            global_variables_snapshot: serde_json::from_str(&self.global_variables_snapshot)?,
            execution_results: serde_json::from_str(&self.execution_results)?,
        })
    }
}

const SELECT_INSTANCE: &str = "SELECT id, project_id, job_id, session_id, status, total_nodes, \
     executed_nodes, failed_nodes, skipped_nodes, current_node_id, started_at_ms, \
     completed_at_ms, duration_ms, global_variables_snapshot, execution_results \
     FROM execution_instances";

impl Store {
    /// Persist a new instance in `running` state, before any scheduling.
    pub async fn create_execution(
        &self,
        instance: &ExecutionInstance,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO execution_instances (id, project_id, job_id, session_id, status, \
             total_nodes, executed_nodes, failed_nodes, skipped_nodes, current_node_id, \
             started_at_ms, global_variables_snapshot, execution_results) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&instance.id)
        .bind(&instance.project_id)
        .bind(&instance.job_id)
        .bind(&instance.session_id)
        .bind(instance.status.as_str())
        .bind(instance.total_nodes as i64)
        .bind(instance.executed_nodes as i64)
        .bind(instance.failed_nodes as i64)
        .bind(instance.skipped_nodes as i64)
        .bind(&instance.current_node_id)
        .bind(instance.started_at_ms as i64)
        .bind(serde_json::to_string(&instance.global_variables_snapshot)?)
        .bind(serde_json::to_string(&instance.execution_results)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_execution(
        &self,
        id: &str,
    ) -> Result<Option<ExecutionInstance>, StorageError> {
        let row: Option<InstanceRow> =
            sqlx::query_as(&format!("{SELECT_INSTANCE} WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(InstanceRow::into_instance).transpose()
    }

    /// Most recent running instance for a job (drives live progress).
    pub async fn latest_execution_for_job(
        &self,
        job_id: &str,
    ) -> Result<Option<ExecutionInstance>, StorageError> {
        let row: Option<InstanceRow> = sqlx::query_as(&format!(
            "{SELECT_INSTANCE} WHERE job_id = ? ORDER BY started_at_ms DESC, rowid DESC LIMIT 1"
        ))
        .bind(job_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(InstanceRow::into_instance).transpose()
    }

    /// Track the node currently in flight (informational).
    pub async fn set_execution_current_node(
        &self,
        execution_id: &str,
        node_id: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE execution_instances SET current_node_id = ? WHERE id = ? \
             AND status = 'running'",
        )
        .bind(node_id)
        .bind(execution_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Append one node's terminal record.
    pub async fn append_execution_log(
        &self,
        log: &NewExecutionLog,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO execution_logs (id, execution_instance_id, node_id, input, output, \
             status, error, duration_ms, created_at_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&log.execution_instance_id)
        .bind(&log.node_id)
        .bind(log.input.as_ref().map(|v| v.to_string()))
        .bind(log.output.as_ref().map(|v| v.to_string()))
        .bind(log.status.as_str())
        .bind(&log.error)
        .bind(log.duration_ms as i64)
        .bind(now_ms as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn list_execution_logs(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionLog>, StorageError> {
        #[derive(FromRow)]
        struct LogRow {
            id: String,
            execution_instance_id: String,
            node_id: String,
            input: Option<String>,
            output: Option<String>,
            status: String,
            error: Option<String>,
            duration_ms: Option<i64>,
            created_at_ms: i64,
        }

        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, execution_instance_id, node_id, input, output, status, error, \
             duration_ms, created_at_ms FROM execution_logs \
             WHERE execution_instance_id = ? ORDER BY created_at_ms ASC, id ASC",
        )
        .bind(execution_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|r| {
                let status = ExecutionLogStatus::parse(&r.status).ok_or_else(|| {
                    StorageError::Conflict(format!("unknown log status {}", r.status))
                })?;
                Ok(ExecutionLog {
                    id: r.id,
                    execution_instance_id: r.execution_instance_id,
                    node_id: r.node_id,
                    status,
                    input: r.input.as_deref().map(serde_json::from_str).transpose()?,
                    output: r.output.as_deref().map(serde_json::from_str).transpose()?,
                    error: r.error,
                    duration_ms: r.duration_ms.map(|v| v as u64),
                    created_at_ms: r.created_at_ms as u64,
                })
            })
            .collect()
    }

    pub async fn count_execution_logs(&self, execution_id: &str) -> Result<u64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM execution_logs WHERE execution_instance_id = ?")
                .bind(execution_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count as u64)
    }

    /// Finalize a run. Idempotent: only the first call against a running
    /// instance writes; later calls are no-ops.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        executed: u32,
        failed: u32,
        skipped: u32,
        completed_at_ms: u64,
        duration_ms: u64,
        execution_results: &serde_json::Value,
    ) -> Result<(), StorageError> {
        debug_assert!(status != ExecutionStatus::Running);
        sqlx::query(
            "UPDATE execution_instances SET status = ?, executed_nodes = ?, failed_nodes = ?, \
             skipped_nodes = ?, current_node_id = NULL, completed_at_ms = ?, duration_ms = ?, \
             execution_results = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(status.as_str())
        .bind(executed as i64)
        .bind(failed as i64)
        .bind(skipped as i64)
        .bind(completed_at_ms as i64)
        .bind(duration_ms as i64)
        .bind(execution_results.to_string())
        .bind(execution_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "executions_tests.rs"]
mod tests;
