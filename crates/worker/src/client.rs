// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the dispatcher's worker surface.

use async_trait::async_trait;
use pw_core::api::{ApiErrorBody, JobUpdate, LeaseResponse, LeasedJob, UpdateAck};
use thiserror::Error;

/// Shared secret header on dispatcher calls.
const SECRET_HEADER: &str = "X-Backend-Secret";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("dispatcher rejected request ({status}): {kind}: {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("malformed dispatcher response: {0}")]
    Decode(String),
}

impl ClientError {
    /// The job reached a terminal state on the dispatcher side.
    pub fn is_terminal_conflict(&self) -> bool {
        matches!(self, ClientError::Api { kind, .. } if kind == "terminal_job")
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// What workers need from the dispatcher. HTTP in production, faked in
/// tests.
#[async_trait]
pub trait DispatchApi: Send + Sync {
    async fn lease(
        &self,
        worker_id: &str,
        kind: &str,
        batch: u32,
    ) -> Result<Vec<LeasedJob>, ClientError>;

    async fn report(&self, job_id: &str, update: &JobUpdate) -> Result<UpdateAck, ClientError>;
}

#[derive(Clone)]
pub struct HttpDispatchClient {
    http: reqwest::Client,
    base_url: String,
    secret: String,
}

impl HttpDispatchClient {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    async fn decode_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        match response.json::<ApiErrorBody>().await {
            Ok(body) => ClientError::Api {
                status,
                kind: body.kind,
                message: body.error,
            },
            Err(_) => ClientError::Api {
                status,
                kind: "unknown".to_string(),
                message: String::new(),
            },
        }
    }
}

#[async_trait]
impl DispatchApi for HttpDispatchClient {
    async fn lease(
        &self,
        worker_id: &str,
        kind: &str,
        batch: u32,
    ) -> Result<Vec<LeasedJob>, ClientError> {
        let batch = batch.to_string();
        let response = self
            .http
            .get(format!("{}/external/jobs", self.base_url))
            .query(&[
                ("status", "queued"),
                ("kind", kind),
                ("batch", batch.as_str()),
                ("worker", worker_id),
            ])
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        let parsed: LeaseResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(parsed.jobs)
    }

    async fn report(&self, job_id: &str, update: &JobUpdate) -> Result<UpdateAck, ClientError> {
        let response = self
            .http
            .patch(format!("{}/external/jobs/{}", self.base_url, job_id))
            .header(SECRET_HEADER, &self.secret)
            .json(update)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
