// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-gateway: the single outbound surface to the chat-completion provider.
//!
//! One gateway value is created per process and shared by reference. It
//! owns the IAM token cache and the circuit breaker; every provider call
//! flows through both.

mod breaker;
mod client;
mod credentials;
mod error;
#[cfg(any(test, feature = "test-support"))]
mod fake;
mod sse;
mod types;

pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use client::{ChatProvider, HttpProvider, ProviderTimeouts};
pub use credentials::{Credential, IamTokenCache, TokenExchanger};
pub use error::GatewayError;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCall, FakeProvider};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, ChoiceMessage, ModelInfo, Role, StreamDelta,
    Usage,
};
