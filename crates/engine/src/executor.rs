// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run loop: dependency-ordered dispatch with bounded parallelism.
//!
//! Persistence ordering is load-bearing: the execution instance is written
//! before any node is scheduled, every termination appends a log row, and
//! the run does not finalize until all appends have acknowledged.

use crate::env::{merge_environment, RunEnv};
use crate::graph::Graph;
use crate::node::{FailurePolicy, NodeContext, NodeOutput, NodeRegistry};
use crate::progress::ProgressLogger;
use crate::EngineError;
use pw_core::{
    format_epoch_ms, CanvasEdge, CanvasNode, Clock, ExecutionId, ExecutionInstance,
    ExecutionLogStatus, ExecutionStatus, NewExecutionLog, VarValue,
};
use pw_storage::Store;
use serde_json::{json, Map, Value};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One evaluation request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project_id: String,
    pub project_name: String,
    pub job_id: Option<String>,
    pub session_id: Option<String>,
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<CanvasEdge>,
    pub initial_variables: BTreeMap<String, VarValue>,
    /// When false, node outputs from the job's previous run seed the
    /// environment so downstream templates can reference them.
    pub clear_results: bool,
}

/// What a finished run reports back.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub execution_instance_id: String,
    pub status: ExecutionStatus,
    pub executed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u64,
    /// Per-node outputs keyed by node id.
    pub execution_results: Value,
    /// Final derived variables (globals overlaid by node env writes).
    pub variables: HashMap<String, String>,
    /// True when a cooperative cancel stopped dispatch early.
    pub cancelled: bool,
}

struct Termination {
    idx: usize,
    duration_ms: u64,
    input: Value,
    policy: FailurePolicy,
    result: Result<NodeOutput, String>,
}

/// Evaluates project graphs. One value per process component; cheap to
/// share behind an `Arc`.
pub struct DagExecutor {
    store: Store,
    registry: Arc<NodeRegistry>,
    log_dir: PathBuf,
    parallelism: usize,
    clock: Arc<dyn Clock>,
}

impl DagExecutor {
    pub fn new(
        store: Store,
        registry: Arc<NodeRegistry>,
        log_dir: PathBuf,
        parallelism: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            log_dir,
            parallelism: parallelism.max(1),
            clock,
        }
    }

    /// Run one project graph to completion.
    ///
    /// Structural problems (cycles, unknown kinds) fail fast; per-node
    /// errors are recorded and the run still produces an outcome.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let graph = Graph::build(&request.nodes, &request.edges)?;
        let handlers = self.resolve_handlers(&request.nodes)?;

        let globals = self.store.list_global_variables(&request.project_id).await?;
        let snapshot = merge_environment(&request.initial_variables, &globals);

        let started_at_ms = self.clock.epoch_ms();
        let execution_id = ExecutionId::generate().to_string();
        let job_key = request
            .job_id
            .clone()
            .unwrap_or_else(|| execution_id.clone());
        let total = graph.len() as u32;

        let env = Arc::new(RunEnv::new(snapshot.clone()));
        if !request.clear_results {
            // Seed before this run's own instance row exists.
            self.seed_previous_results(&request, &env).await;
        }

        // 1. Instance row exists before anything is scheduled.
        self.store
            .create_execution(&ExecutionInstance {
                id: execution_id.clone(),
                project_id: request.project_id.clone(),
                job_id: request.job_id.clone(),
                session_id: request.session_id.clone(),
                status: ExecutionStatus::Running,
                total_nodes: total,
                executed_nodes: 0,
                failed_nodes: 0,
                skipped_nodes: 0,
                current_node_id: None,
                started_at_ms,
                completed_at_ms: None,
                duration_ms: None,
                global_variables_snapshot: snapshot.clone(),
                execution_results: json!({}),
            })
            .await?;

        let progress =
            ProgressLogger::create(&self.log_dir, &request.project_name, &job_key, started_at_ms);

        tracing::info!(
            execution_id,
            project_id = request.project_id,
            job_id = ?request.job_id,
            total_nodes = total,
            parallelism = self.parallelism,
            "run started"
        );

        // 2. Dispatch loop.
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = graph
            .sources()
            .into_iter()
            .map(|idx| Reverse((graph.depth[idx], idx)))
            .collect();
        let mut pending: Vec<usize> = graph.indegree.clone();
        let mut inflight: JoinSet<Termination> = JoinSet::new();
        let mut log_tasks: JoinSet<()> = JoinSet::new();

        let mut results: Map<String, Value> = Map::new();
        let mut node_logs: Vec<Value> = Vec::new();
        let mut executed = 0u32;
        let mut failed = 0u32;
        let mut stopped = false;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() && !cancelled {
                cancelled = true;
                tracing::info!(execution_id, "cancellation requested, draining in-flight nodes");
            }

            if !stopped && !cancelled {
                while inflight.len() < self.parallelism {
                    let Some(Reverse((_, idx))) = ready.pop() else {
                        break;
                    };
                    let node = &request.nodes[idx];
                    let _ = self
                        .store
                        .set_execution_current_node(&execution_id, Some(&node.id))
                        .await;
                    let mut inputs = HashMap::new();
                    for &pred in &graph.predecessors[idx] {
                        let pred_id = &request.nodes[pred].id;
                        // Failed predecessors simply have no entry.
                        if let Some(value) = results.get(pred_id) {
                            inputs.insert(pred_id.clone(), value.clone());
                        }
                    }
                    self.dispatch(idx, node, inputs, &handlers[idx], &env, &mut inflight);
                }
            }

            let Some(joined) = inflight.join_next().await else {
                break;
            };
            let termination = match joined {
                Ok(t) => t,
                Err(e) => {
                    // A panicking handler poisons the run; stop dispatch.
                    tracing::error!(execution_id, error = %e, "node task aborted");
                    failed += 1;
                    stopped = true;
                    continue;
                }
            };

            let idx = termination.idx;
            let node = &request.nodes[idx];
            let now_ms = self.clock.epoch_ms();
            let (ok, output_value, error_text) = match termination.result {
                Ok(output) => {
                    executed += 1;
                    env.publish(&node.id, output.value.clone(), &output.env_writes);
                    (true, Some(output.value), None)
                }
                Err(message) => {
                    failed += 1;
                    if termination.policy == FailurePolicy::StopOnError {
                        stopped = true;
                    }
                    (false, None, Some(message))
                }
            };
            let done = executed + failed;

            if let Some(value) = &output_value {
                results.insert(node.id.clone(), value.clone());
            }
            node_logs.push(json!({
                "nodeId": node.id,
                "label": node.display_label(),
                "status": if ok { "completed" } else { "failed" },
                "durationMs": termination.duration_ms,
                "error": error_text,
            }));

            // 3. Fire the log append without blocking the loop; all appends
            // are joined before finalize.
            let log = NewExecutionLog {
                execution_instance_id: execution_id.clone(),
                node_id: node.id.clone(),
                status: if ok {
                    ExecutionLogStatus::Completed
                } else {
                    ExecutionLogStatus::Failed
                },
                input: Some(termination.input),
                output: output_value,
                error: error_text.clone(),
                duration_ms: termination.duration_ms,
            };
            let store = self.store.clone();
            log_tasks.spawn(async move {
                if let Err(e) = store.append_execution_log(&log, now_ms).await {
                    tracing::error!(
                        execution_instance_id = log.execution_instance_id,
                        node_id = log.node_id,
                        error = %e,
                        "failed to append execution log"
                    );
                }
            });

            progress.node_line(
                now_ms,
                ok,
                node.display_label(),
                &node.id,
                termination.duration_ms,
                done,
                total,
                error_text.as_deref(),
            );

            for &succ in &graph.successors[idx] {
                pending[succ] -= 1;
                if pending[succ] == 0 {
                    ready.push(Reverse((graph.depth[succ], succ)));
                }
            }
        }

        // 4. All log appends acknowledged before finalize.
        while log_tasks.join_next().await.is_some() {}

        let skipped = total - executed - failed;
        let status = if stopped || (cancelled && skipped > 0) {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        let completed_at_ms = self.clock.epoch_ms();
        let duration_ms = completed_at_ms.saturating_sub(started_at_ms);
        let execution_results = Value::Object(results);

        self.store
            .finalize_execution(
                &execution_id,
                status,
                executed,
                failed,
                skipped,
                completed_at_ms,
                duration_ms,
                &execution_results,
            )
            .await?;

        self.write_dump(
            &request,
            &execution_id,
            &job_key,
            &snapshot,
            status,
            started_at_ms,
            completed_at_ms,
            (total, executed, failed, skipped),
            &node_logs,
            &execution_results,
            &progress,
        )
        .await;

        tracing::info!(
            execution_id,
            status = status.as_str(),
            executed,
            failed,
            skipped,
            duration_ms,
            "run finished"
        );

        Ok(RunOutcome {
            execution_instance_id: execution_id,
            status,
            executed,
            failed,
            skipped,
            duration_ms,
            execution_results,
            variables: env.variables(),
            cancelled,
        })
    }

    fn resolve_handlers(
        &self,
        nodes: &[CanvasNode],
    ) -> Result<Vec<Arc<dyn crate::node::NodeHandler>>, EngineError> {
        nodes
            .iter()
            .map(|node| {
                self.registry
                    .get(&node.node_type)
                    .ok_or_else(|| EngineError::UnknownNodeKind(node.node_type.clone()))
            })
            .collect()
    }

    /// Seed node outputs from the job's most recent run.
    async fn seed_previous_results(&self, request: &RunRequest, env: &RunEnv) {
        let Some(job_id) = &request.job_id else {
            return;
        };
        match self.store.latest_execution_for_job(job_id).await {
            Ok(Some(previous)) => {
                if let Value::Object(map) = previous.execution_results {
                    for (node_id, value) in map {
                        env.publish(&node_id, value, &HashMap::new());
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(job_id, error = %e, "could not load previous results");
            }
        }
    }

    fn dispatch(
        &self,
        idx: usize,
        node: &CanvasNode,
        inputs: HashMap<String, Value>,
        handler: &Arc<dyn crate::node::NodeHandler>,
        env: &Arc<RunEnv>,
        inflight: &mut JoinSet<Termination>,
    ) {
        let ctx = NodeContext {
            node_id: node.id.clone(),
            label: node.display_label().to_string(),
            data: node.data.clone(),
            inputs,
            env: Arc::clone(env),
        };
        let policy = handler.failure_policy(&node.data);
        let handler = Arc::clone(handler);
        let input = node.data.clone();
        let node_id = node.id.clone();

        inflight.spawn(async move {
            let started = std::time::Instant::now();
            let result = handler
                .evaluate(ctx)
                .await
                .map_err(|e| e.message);
            let duration_ms = started.elapsed().as_millis() as u64;
            if let Err(error) = &result {
                tracing::warn!(node_id, error, "node evaluation failed");
            }
            Termination {
                idx,
                duration_ms,
                input,
                policy,
                result,
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_dump(
        &self,
        request: &RunRequest,
        execution_id: &str,
        job_key: &str,
        snapshot: &BTreeMap<String, VarValue>,
        status: ExecutionStatus,
        started_at_ms: u64,
        completed_at_ms: u64,
        totals: (u32, u32, u32, u32),
        node_logs: &[Value],
        execution_results: &Value,
        progress: &ProgressLogger,
    ) {
        let responses = match &request.session_id {
            Some(session_id) => self
                .store
                .list_responses(session_id)
                .await
                .map(|rs| serde_json::to_value(rs).unwrap_or(Value::Null))
                .unwrap_or(Value::Null),
            None => json!([]),
        };
        let (total, executed, failed, skipped) = totals;
        let dump = json!({
            "metadata": {
                "projectId": request.project_id,
                "projectName": request.project_name,
                "jobId": request.job_id,
                "sessionId": request.session_id,
                "executionInstanceId": execution_id,
                "startedAt": format_epoch_ms(started_at_ms),
                "completedAt": format_epoch_ms(completed_at_ms),
            },
            "execution": {
                "status": status.as_str(),
                "durationMs": completed_at_ms.saturating_sub(started_at_ms),
            },
            "stats": {
                "totalNodes": total,
                "executed": executed,
                "failed": failed,
                "skipped": skipped,
            },
            "questionnaireResponses": responses,
            "globalVariables": snapshot,
            "nodeLogs": node_logs,
            "executionResults": execution_results,
        });
        progress.write_dump(
            &self.log_dir,
            &request.project_name,
            job_key,
            started_at_ms,
            &dump,
        );
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
