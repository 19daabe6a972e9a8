// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP provider client: completion, streaming, model listing.

use crate::breaker::CircuitBreaker;
use crate::credentials::{Credential, IamTokenCache, TokenExchanger};
use crate::sse::SseParser;
use crate::types::{ChatRequest, ChatResponse, ModelInfo, StreamDelta};
use crate::GatewayError;
use futures::StreamExt;
use pw_core::config::{BreakerConfig, IamConfig, ProviderConfig};
use pw_core::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Evaluate a chat request against the provider.
///
/// The production implementation is [`HttpProvider`]; tests use
/// `FakeProvider`.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError>;

    /// Start a streamed completion; deltas arrive on the returned channel.
    /// Dropping the receiver cancels the stream.
    async fn stream_complete(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamDelta, GatewayError>>, GatewayError>;
}

/// Hard deadlines per call class.
#[derive(Debug, Clone, Copy)]
pub struct ProviderTimeouts {
    /// IAM token exchange.
    pub iam: Duration,
    /// Chat completion; long reasoning jobs run for a long time.
    pub complete: Duration,
    /// Models listing.
    pub models: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            iam: Duration::from_secs(60),
            complete: Duration::from_secs(90 * 60),
            models: Duration::from_secs(30),
        }
    }
}

struct HttpExchanger {
    http: reqwest::Client,
    iam_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IamExchangeResponse {
    iam_token: String,
}

#[async_trait::async_trait]
impl TokenExchanger for HttpExchanger {
    async fn exchange(&self, oauth_token: &str) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(&self.iam_url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "yandexPassportOauthToken": oauth_token }))
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = truncated_body(response).await;
            return Err(GatewayError::from_status(status.as_u16(), body));
        }
        let parsed: IamExchangeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(parsed.iam_token)
    }
}

/// Production gateway over the remote provider.
pub struct HttpProvider {
    http: reqwest::Client,
    base_url: String,
    default_model: String,
    credential: Credential,
    cache: IamTokenCache,
    exchanger: HttpExchanger,
    breaker: CircuitBreaker,
    timeouts: ProviderTimeouts,
}

impl HttpProvider {
    pub fn new(
        provider: &ProviderConfig,
        breaker: &BreakerConfig,
        iam: &IamConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        Self::with_timeouts(provider, breaker, iam, clock, ProviderTimeouts::default())
    }

    pub fn with_timeouts(
        provider: &ProviderConfig,
        breaker: &BreakerConfig,
        iam: &IamConfig,
        clock: Arc<dyn Clock>,
        timeouts: ProviderTimeouts,
    ) -> Result<Self, GatewayError> {
        let credential = match (&provider.api_key, &provider.oauth_token) {
            (Some(key), _) => Credential::ApiKey(key.clone()),
            (None, Some(token)) => Credential::OAuth(token.clone()),
            (None, None) => {
                return Err(GatewayError::BadRequest {
                    status: 0,
                    message: "no provider credential configured".to_string(),
                })
            }
        };
        let http = reqwest::Client::new();
        Ok(Self {
            exchanger: HttpExchanger {
                http: http.clone(),
                iam_url: provider.iam_url.clone(),
                timeout: timeouts.iam,
            },
            http,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            default_model: provider.default_model.clone(),
            credential,
            cache: IamTokenCache::new(iam.ttl_ms(), iam.refresh_window_ms(), Arc::clone(&clock)),
            breaker: CircuitBreaker::new(
                breaker.failure_threshold,
                breaker.cooldown_seconds,
                clock,
            ),
            timeouts,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        match &self.credential {
            Credential::ApiKey(key) => Ok(key.clone()),
            Credential::OAuth(token) => self.cache.bearer(token, &self.exchanger).await,
        }
    }

    fn admit(&self) -> Result<(), GatewayError> {
        self.breaker
            .admit()
            .map_err(|retry_in_secs| GatewayError::ProviderUnavailable { retry_in_secs })
    }

    /// Record a chat-call outcome against the breaker.
    fn settle<T>(&self, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.counts_for_breaker() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }

    fn fill_model(&self, request: &mut ChatRequest) {
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }
    }

    /// List available models, when the provider supports it.
    pub async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        #[derive(Deserialize)]
        struct ModelList {
            #[serde(default)]
            data: Vec<ModelInfo>,
        }

        self.admit()?;
        let token = self.bearer().await?;
        let result = async {
            let response = self
                .http
                .get(format!("{}/models", self.base_url))
                .bearer_auth(&token)
                .timeout(self.timeouts.models)
                .send()
                .await
                .map_err(|e| classify_transport(e, self.timeouts.models))?;
            let status = response.status();
            if !status.is_success() {
                let body = truncated_body(response).await;
                return Err(GatewayError::from_status(status.as_u16(), body));
            }
            let parsed: ModelList = response
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            Ok(parsed.data)
        }
        .await;
        self.settle(result)
    }
}

#[async_trait::async_trait]
impl ChatProvider for HttpProvider {
    async fn complete(&self, mut request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        self.admit()?;
        self.fill_model(&mut request);
        request.stream = false;
        let token = self.bearer().await?;

        let result = async {
            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&token)
                .timeout(self.timeouts.complete)
                .json(&request)
                .send()
                .await
                .map_err(|e| classify_transport(e, self.timeouts.complete))?;

            let status = response.status();
            if !status.is_success() {
                let body = truncated_body(response).await;
                return Err(GatewayError::from_status(status.as_u16(), body));
            }
            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))
        }
        .await;

        self.settle(result)
    }

    async fn stream_complete(
        &self,
        mut request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamDelta, GatewayError>>, GatewayError> {
        #[derive(Deserialize)]
        struct DeltaFrame {
            #[serde(default)]
            choices: Vec<DeltaChoice>,
        }
        #[derive(Deserialize)]
        struct DeltaChoice {
            #[serde(default)]
            delta: DeltaContent,
        }
        #[derive(Deserialize, Default)]
        struct DeltaContent {
            #[serde(default)]
            content: Option<String>,
        }

        self.admit()?;
        self.fill_model(&mut request);
        request.stream = true;
        let token = self.bearer().await?;

        let opened = async {
            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&token)
                .timeout(self.timeouts.complete)
                .json(&request)
                .send()
                .await
                .map_err(|e| classify_transport(e, self.timeouts.complete))?;
            let status = response.status();
            if !status.is_success() {
                let body = truncated_body(response).await;
                return Err(GatewayError::from_status(status.as_u16(), body));
            }
            Ok(response)
        }
        .await;
        let response = self.settle(opened)?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GatewayError::Transport(e.to_string())))
                            .await;
                        return;
                    }
                };
                for payload in parser.push(&chunk) {
                    let delta = match serde_json::from_str::<DeltaFrame>(&payload) {
                        Ok(frame) => frame
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed stream frame");
                            None
                        }
                    };
                    if let Some(content) = delta {
                        // A closed receiver means the caller cancelled.
                        if tx.send(Ok(StreamDelta { content })).await.is_err() {
                            return;
                        }
                    }
                }
                if parser.is_done() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

fn classify_transport(error: reqwest::Error, deadline: Duration) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(deadline.as_secs())
    } else {
        GatewayError::Transport(error.to_string())
    }
}

async fn truncated_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    let mut body = body.replace('\n', " ");
    body.truncate(300);
    body
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
