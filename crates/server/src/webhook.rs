// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-report forwarding to the front-end.
//!
//! Delivery is best-effort with bounded exponential backoff. Persistent
//! failure never blocks job finalization: the report rows remain the
//! source of truth and the front-end poller reads them eventually.

use pw_core::api::JobUpdate;
use pw_core::config::WebhookConfig;
use std::time::Duration;

/// Shared secret header on dispatcher↔front-end calls.
pub const BACKEND_SECRET_HEADER: &str = "X-Backend-Secret";

#[derive(Clone)]
pub struct WebhookSender {
    http: reqwest::Client,
    /// Front-end inbound endpoint base; `None` disables forwarding.
    url: Option<String>,
    secret: String,
    config: WebhookConfig,
}

impl WebhookSender {
    pub fn new(url: Option<String>, secret: String, config: WebhookConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.map(|u| u.trim_end_matches('/').to_string()),
            secret,
            config,
        }
    }

    /// Disabled sender for deployments without a front-end webhook.
    pub fn disabled() -> Self {
        Self::new(None, String::new(), WebhookConfig::default())
    }

    /// Fire delivery in the background; job finalization never waits.
    pub fn spawn_deliver(&self, update: JobUpdate) {
        if self.url.is_none() {
            return;
        }
        let sender = self.clone();
        tokio::spawn(async move {
            sender.deliver(update).await;
        });
    }

    /// Deliver with backoff; returns true when the front-end acknowledged.
    pub async fn deliver(&self, update: JobUpdate) -> bool {
        let Some(url) = &self.url else {
            return false;
        };
        let target = format!("{}/{}", url, update.job_id);

        let mut backoff_ms = self.config.backoff_ms;
        for attempt in 1..=self.config.max_attempts {
            let result = self
                .http
                .patch(&target)
                .header(BACKEND_SECRET_HEADER, &self.secret)
                .json(&update)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(job_id = update.job_id, attempt, "webhook delivered");
                    return true;
                }
                Ok(response) => {
                    tracing::warn!(
                        job_id = update.job_id,
                        attempt,
                        status = response.status().as_u16(),
                        "webhook rejected"
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = update.job_id, attempt, error = %e, "webhook send failed");
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(self.config.backoff_cap_ms);
            }
        }
        tracing::error!(
            job_id = update.job_id,
            attempts = self.config.max_attempts,
            "webhook delivery exhausted; reports remain on the dispatcher"
        );
        false
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
