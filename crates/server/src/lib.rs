// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-server: the dispatcher service.
//!
//! Owns the authoritative job queue: enqueue from the front-end, atomic
//! leasing to workers, progress and terminal updates, report delivery via
//! webhook, the lease reaper, and the batch coordinator. Everything is
//! exposed over HTTP+JSON (axum).

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod reaper;
pub mod routes;
pub mod state;
pub mod webhook;

pub use dispatch::Dispatcher;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
pub use webhook::WebhookSender;
