// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error envelope for the API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pw_core::api::ApiErrorBody;
use pw_core::ErrorKind;
use pw_storage::StorageError;

/// Wraps an [`ErrorKind`] for axum handlers.
#[derive(Debug)]
pub struct ApiError(pub ErrorKind);

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self(kind)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self(e.kind())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0;
        let status =
            StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = kind.label(), error = %kind, "request failed");
        }
        let retry_in_secs = match &kind {
            ErrorKind::ProviderUnavailable { retry_in_secs } => Some(*retry_in_secs),
            _ => None,
        };
        let body = ApiErrorBody {
            error: kind.to_string(),
            kind: kind.label().to_string(),
            retry_in_secs,
        };
        (status, Json(body)).into_response()
    }
}
