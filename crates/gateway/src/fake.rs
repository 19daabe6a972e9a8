// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake chat provider for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::client::ChatProvider;
use crate::types::{ChatRequest, ChatResponse, Choice, ChoiceMessage, StreamDelta};
use crate::GatewayError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recorded call to FakeProvider
#[derive(Debug, Clone)]
pub enum FakeCall {
    Complete { model: String, prompt: String },
    Stream { model: String, prompt: String },
}

enum Scripted {
    Text(String),
    Error(fn() -> GatewayError),
}

/// Fake provider for testing
///
/// Replies with scripted responses in order and records all calls. With an
/// empty script it echoes the last user message.
#[derive(Clone)]
pub struct FakeProvider {
    inner: Arc<Mutex<FakeState>>,
}

struct FakeState {
    script: VecDeque<Scripted>,
    calls: Vec<FakeCall>,
    delay_ms: u64,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                script: VecDeque::new(),
                calls: Vec::new(),
                delay_ms: 0,
            })),
        }
    }

    /// Queue a canned completion text.
    pub fn push_text(&self, text: impl Into<String>) {
        self.inner.lock().script.push_back(Scripted::Text(text.into()));
    }

    /// Queue a canned failure.
    pub fn push_error(&self, make: fn() -> GatewayError) {
        self.inner.lock().script.push_back(Scripted::Error(make));
    }

    /// Delay every call, for renewal/cancellation tests.
    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.inner.lock().delay_ms = delay_ms;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<FakeCall> {
        self.inner.lock().calls.clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        match self.inner.lock().script.pop_front() {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Error(make)) => Err(make()),
            None => Ok(request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default()),
        }
    }

    fn record(&self, call: FakeCall) -> u64 {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        inner.delay_ms
    }
}

fn prompt_of(request: &ChatRequest) -> String {
    request
        .messages
        .last()
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ChatProvider for FakeProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let delay = self.record(FakeCall::Complete {
            model: request.model.clone(),
            prompt: prompt_of(&request),
        });
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let text = self.next_reply(&request)?;
        Ok(ChatResponse {
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content: text,
                    reasoning: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }

    async fn stream_complete(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamDelta, GatewayError>>, GatewayError> {
        self.record(FakeCall::Stream {
            model: request.model.clone(),
            prompt: prompt_of(&request),
        });
        let text = self.next_reply(&request)?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            // Two-character chunks exercise reassembly in callers.
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(2) {
                let delta = StreamDelta {
                    content: chunk.iter().collect(),
                };
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
