// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-worker: the worker pool.
//!
//! Long-lived cooperative workers, N per pipeline kind. Each loops:
//! lease one job over HTTP, run the DAG executor, report the terminal
//! state. Progress touches renew the lease while a run is in flight;
//! SIGTERM drains in-flight work and gives leased jobs back to the queue.

mod client;
mod pool;
mod runner;

pub use client::{ClientError, DispatchApi, HttpDispatchClient};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use runner::JobRunner;
