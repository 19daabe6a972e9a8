// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-storage: relational store for the dispatch platform.
//!
//! SQLite via sqlx. The database is the coordination point for jobs,
//! batches, sessions, and execution records; lease acquisition and status
//! transitions are single guarded statements so concurrent dispatchers and
//! workers never race.

mod batches;
mod db;
mod error;
mod executions;
mod jobs;
mod projects;
mod sessions;
mod settings;

pub use db::Store;
pub use error::StorageError;
pub use jobs::{NewJob, ReapOutcome};
pub use projects::NewProject;
