// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-facing error taxonomy.
//!
//! Every failure surfaced across a service boundary is classified as one of
//! these kinds; the HTTP layer maps kinds to status codes.

use thiserror::Error;

/// Caller-visible failure classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    /// Circuit breaker is open; carries the remaining cooldown.
    #[error("provider unavailable, retry in {retry_in_secs}s")]
    ProviderUnavailable { retry_in_secs: u64 },
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("provider rejected credentials")]
    AuthRejected,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("job already terminal: {0}")]
    TerminalJob(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Stable machine-readable label for wire payloads and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound(_) => "not_found",
            ErrorKind::Conflict(_) => "conflict",
            ErrorKind::BadRequest(_) => "bad_request",
            ErrorKind::InvalidGraph(_) => "invalid_graph",
            ErrorKind::ProviderUnavailable { .. } => "provider_unavailable",
            ErrorKind::ProviderError(_) => "provider_error",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::Timeout(_) => "timeout",
            ErrorKind::TerminalJob(_) => "terminal_job",
            ErrorKind::Internal(_) => "internal",
        }
    }

    /// HTTP status code for the API surface.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest(_) | ErrorKind::InvalidGraph(_) => 400,
            ErrorKind::Unauthorized | ErrorKind::AuthRejected => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound(_) => 404,
            ErrorKind::Conflict(_) | ErrorKind::TerminalJob(_) => 409,
            ErrorKind::Internal(_) | ErrorKind::ProviderError(_) => 500,
            ErrorKind::ProviderUnavailable { .. } => 503,
            ErrorKind::Timeout(_) => 504,
        }
    }
}
