// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway error type and provider-response classification.

use pw_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Breaker is open; carries remaining cooldown seconds.
    #[error("provider unavailable, retry in {retry_in_secs}s")]
    ProviderUnavailable { retry_in_secs: u64 },
    #[error("provider error ({status}): {message}")]
    ProviderError { status: u16, message: String },
    #[error("provider rejected credentials ({status})")]
    AuthRejected { status: u16 },
    #[error("bad request ({status}): {message}")]
    BadRequest { status: u16, message: String },
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Only provider-origin faults trip the breaker; auth and caller
    /// errors never do.
    pub fn counts_for_breaker(&self) -> bool {
        matches!(
            self,
            GatewayError::ProviderError { .. }
                | GatewayError::Transport(_)
                | GatewayError::Timeout(_)
        )
    }

    /// Classify for the API surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ProviderUnavailable { retry_in_secs } => {
                ErrorKind::ProviderUnavailable {
                    retry_in_secs: *retry_in_secs,
                }
            }
            GatewayError::ProviderError { status, message } => {
                ErrorKind::ProviderError(format!("{status}: {message}"))
            }
            GatewayError::AuthRejected { .. } => ErrorKind::AuthRejected,
            GatewayError::BadRequest { status, message } => {
                ErrorKind::BadRequest(format!("{status}: {message}"))
            }
            GatewayError::Timeout(secs) => ErrorKind::Timeout(format!("after {secs}s")),
            GatewayError::Transport(m) => ErrorKind::ProviderError(m.clone()),
            GatewayError::Decode(m) => ErrorKind::ProviderError(m.clone()),
        }
    }

    /// Map an HTTP status to the matching error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => GatewayError::AuthRejected { status },
            400..=499 => GatewayError::BadRequest { status, message },
            _ => GatewayError::ProviderError { status, message },
        }
    }
}
