// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the executor

use pw_core::ErrorKind;
use pw_storage::StorageError;
use thiserror::Error;

/// Structural failures that prevent a run from starting or persisting.
///
/// Per-node evaluation errors are not represented here: they are recorded
/// in the execution log and the run continues (or stops per the node's
/// failure policy), but the run itself still returns an outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    #[error("unknown node kind: {0}")]
    UnknownNodeKind(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidGraph(m) => ErrorKind::InvalidGraph(m.clone()),
            EngineError::UnknownNodeKind(m) => {
                ErrorKind::InvalidGraph(format!("unknown node kind: {m}"))
            }
            EngineError::Storage(e) => e.kind(),
        }
    }
}
