// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node evaluation contract and the kind registry.
//!
//! The executor is closed to node-kind internals: it hands each node's
//! opaque `data` blob to the handler registered for `node.type` and
//! records whatever comes back.

use crate::env::RunEnv;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Per-node failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and keep scheduling (the default).
    #[default]
    ContinueOnError,
    /// Stop dispatching new nodes; in-flight nodes finish, the run
    /// finalizes as failed, unreached nodes count as skipped.
    StopOnError,
}

/// Evaluation failure, recorded in the execution log.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<pw_gateway::GatewayError> for NodeError {
    fn from(e: pw_gateway::GatewayError) -> Self {
        Self::new(e.to_string())
    }
}

/// What a node evaluation produces.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    /// Serializable result blob stored in the execution log and results.
    pub value: Value,
    /// Names published into the derived variables map.
    pub env_writes: HashMap<String, String>,
}

impl NodeOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            env_writes: HashMap::new(),
        }
    }
}

/// Everything a handler may look at while evaluating one node.
pub struct NodeContext {
    pub node_id: String,
    pub label: String,
    /// Opaque per-kind configuration from the canvas.
    pub data: Value,
    /// Outputs of direct predecessors, keyed by node id.
    pub inputs: HashMap<String, Value>,
    /// Read access to globals and node outputs.
    pub env: Arc<RunEnv>,
}

/// One node kind. Registered at startup; the executor never inspects
/// `data` itself.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The `node.type` tag this handler serves.
    fn kind(&self) -> &'static str;

    /// Failure policy for a concrete node. The default honors a
    /// `stopOnError` flag in the node data.
    fn failure_policy(&self, data: &Value) -> FailurePolicy {
        if data.get("stopOnError").and_then(Value::as_bool) == Some(true) {
            FailurePolicy::StopOnError
        } else {
            FailurePolicy::ContinueOnError
        }
    }

    async fn evaluate(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Kind → handler registry, closed after startup.
#[derive(Default)]
pub struct NodeRegistry {
    handlers: HashMap<&'static str, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; later registrations for a kind win.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}
