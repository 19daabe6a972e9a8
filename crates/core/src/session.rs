// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and response entities.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a questionnaire session.
    pub struct SessionId;
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(SessionStatus::InProgress),
            "COMPLETED" => Some(SessionStatus::Completed),
            "ABANDONED" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// A questionnaire session.
///
/// Created on the first answer, sealed at `COMPLETED`; sealing triggers a
/// job. `job_id`/`job_status` are a weak back-reference to the dispatcher's
/// job table: relation plus lookup, never ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    pub mode: String,
    pub status: SessionStatus,
    pub total_questions: u32,
    pub current_index: u32,
    pub job_id: Option<String>,
    pub job_status: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// One answered question, append-only until the session is sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub session_id: String,
    pub question_id: u32,
    pub question_text: String,
    pub answer: String,
    pub answered_at: String,
    pub time_spent: Option<u32>,
    pub token_count: Option<u32>,
    pub char_count: Option<u32>,
}
