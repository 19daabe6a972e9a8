// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error type and its mapping onto the caller-facing taxonomy.

use pw_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("job already terminal: {0}")]
    TerminalJob(String),
}

impl StorageError {
    /// Classify for the API surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(m) => ErrorKind::NotFound(m.clone()),
            StorageError::Conflict(m) => ErrorKind::Conflict(m.clone()),
            StorageError::TerminalJob(m) => ErrorKind::TerminalJob(m.clone()),
            StorageError::Sqlx(e) => ErrorKind::Internal(e.to_string()),
            StorageError::Json(e) => ErrorKind::Internal(e.to_string()),
        }
    }
}
