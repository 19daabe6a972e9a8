// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project (DAG + globals) domain types.
//!
//! The canvas is round-trip safe: unknown node/edge fields are preserved
//! through deserialize/serialize so stored project JSON is never degraded
//! by a load-edit-save cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed variable record as carried in environments and snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl VarValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
            folder: None,
        }
    }
}

/// A node on the project canvas.
///
/// `data` is opaque to the dispatcher; only the registered node-kind
/// handler interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl CanvasNode {
    /// Display label, falling back to the node id.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// A directed dependency between two canvas nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The persisted drawing: nodes, edges, viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub viewport: Value,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A stored project definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// System projects cannot be deleted.
    #[serde(default)]
    pub is_system: bool,
    pub canvas: Canvas,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn pipeline_kind(&self) -> &'static str {
        pipeline_kind_of(&self.name)
    }
}

/// An admin-managed global variable scoped to one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl GlobalVariable {
    pub fn as_var_value(&self) -> VarValue {
        VarValue {
            value: self.value.clone(),
            description: self.description.clone(),
            folder: self.folder.clone(),
        }
    }
}

/// Route a project to a worker group by name.
///
/// Two kinds exist today; anything that is not a BigFive project runs on
/// the Prof pool.
pub fn pipeline_kind_of(project_name: &str) -> &'static str {
    if project_name.to_ascii_lowercase().contains("bigfive") {
        "BigFive"
    } else {
        "Prof"
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
