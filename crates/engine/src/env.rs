// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run variable environment.
//!
//! The merged snapshot is frozen before scheduling and never mutated
//! in-run. Node outputs land in a separate per-run map, and `env_writes`
//! publish into a derived string map that shadows snapshot names.

use parking_lot::Mutex;
use pw_core::{GlobalVariable, VarValue};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Merge the initial environment over project-stored globals.
///
/// Initial values take precedence on name collisions.
pub fn merge_environment(
    initial: &BTreeMap<String, VarValue>,
    globals: &[GlobalVariable],
) -> BTreeMap<String, VarValue> {
    let mut merged: BTreeMap<String, VarValue> = globals
        .iter()
        .map(|g| (g.name.clone(), g.as_var_value()))
        .collect();
    for (name, value) in initial {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Shared environment handed to node evaluations.
///
/// Multiple nodes are in flight at once; the mutable maps are guarded and
/// reads take point-in-time copies.
pub struct RunEnv {
    snapshot: BTreeMap<String, VarValue>,
    derived: Mutex<HashMap<String, String>>,
    node_outputs: Mutex<HashMap<String, Value>>,
}

impl RunEnv {
    pub fn new(snapshot: BTreeMap<String, VarValue>) -> Self {
        Self {
            snapshot,
            derived: Mutex::new(HashMap::new()),
            node_outputs: Mutex::new(HashMap::new()),
        }
    }

    /// The frozen snapshot written to the execution instance.
    pub fn snapshot(&self) -> &BTreeMap<String, VarValue> {
        &self.snapshot
    }

    /// Current view for template resolution: snapshot values overlaid by
    /// derived writes.
    pub fn variables(&self) -> HashMap<String, String> {
        let mut view: HashMap<String, String> = self
            .snapshot
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        for (k, v) in self.derived.lock().iter() {
            view.insert(k.clone(), v.clone());
        }
        view
    }

    /// Read one variable (derived first, then snapshot).
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.derived.lock().get(name) {
            return Some(v.clone());
        }
        self.snapshot.get(name).map(|v| v.value.clone())
    }

    /// Publish one node's output and its environment writes.
    pub fn publish(&self, node_id: &str, output: Value, env_writes: &HashMap<String, String>) {
        self.node_outputs
            .lock()
            .insert(node_id.to_string(), output);
        let mut derived = self.derived.lock();
        for (name, value) in env_writes {
            derived.insert(name.clone(), value.clone());
        }
    }

    pub fn node_output(&self, node_id: &str) -> Option<Value> {
        self.node_outputs.lock().get(node_id).cloned()
    }

    /// All node outputs recorded so far.
    pub fn node_outputs(&self) -> HashMap<String, Value> {
        self.node_outputs.lock().clone()
    }
}
