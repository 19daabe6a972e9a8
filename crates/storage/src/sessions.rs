// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session, response, and report persistence.

use crate::{Store, StorageError};
use pw_core::{Report, ReportType, Response, Session, SessionStatus, Visibility};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    user_id: Option<String>,
    mode: String,
    status: String,
    total_questions: i64,
    current_index: i64,
    job_id: Option<String>,
    job_status: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<Session, StorageError> {
        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Conflict(format!("unknown session status {}", self.status))
        })?;
        Ok(Session {
            id: self.id,
            user_id: self.user_id,
            mode: self.mode,
            status,
            total_questions: self.total_questions as u32,
            current_index: self.current_index as u32,
            job_id: self.job_id,
            job_status: self.job_status,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: String,
    session_id: String,
    user_id: Option<String>,
    report_type: String,
    content: String,
    visibility: String,
    created_at: String,
}

impl ReportRow {
    fn into_report(self) -> Result<Report, StorageError> {
        let report_type = ReportType::parse(&self.report_type).ok_or_else(|| {
            StorageError::Conflict(format!("unknown report type {}", self.report_type))
        })?;
        let visibility = Visibility::parse(&self.visibility).ok_or_else(|| {
            StorageError::Conflict(format!("unknown visibility {}", self.visibility))
        })?;
        Ok(Report {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            report_type,
            content: self.content,
            visibility,
            created_at: self.created_at,
        })
    }
}

impl Store {
    pub async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, mode, status, total_questions, current_index, \
             job_id, job_status, started_at, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.mode)
        .bind(session.status.as_str())
        .bind(session.total_questions as i64)
        .bind(session.current_index as i64)
        .bind(&session.job_id)
        .bind(&session.job_status)
        .bind(&session.started_at)
        .bind(&session.completed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, mode, status, total_questions, current_index, job_id, \
             job_status, started_at, completed_at FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Record the job attached to a session (set at enqueue time).
    pub async fn set_session_job(
        &self,
        session_id: &str,
        job_id: &str,
        job_status: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE sessions SET job_id = ?, job_status = ? WHERE id = ?")
            .bind(job_id)
            .bind(job_status)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    pub async fn set_session_job_status(
        &self,
        session_id: &str,
        job_status: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE sessions SET job_status = ? WHERE id = ?")
            .bind(job_status)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    /// Append one answer; (session, question) duplicates are a conflict.
    pub async fn insert_response(&self, response: &Response) -> Result<(), StorageError> {
        let result = sqlx::query(
            "INSERT INTO responses (id, session_id, question_id, question_text, answer, \
             answered_at, time_spent, token_count, char_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&response.id)
        .bind(&response.session_id)
        .bind(response.question_id as i64)
        .bind(&response.question_text)
        .bind(&response.answer)
        .bind(&response.answered_at)
        .bind(response.time_spent.map(|v| v as i64))
        .bind(response.token_count.map(|v| v as i64))
        .bind(response.char_count.map(|v| v as i64))
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::Conflict(format!(
                    "question {} already answered in session {}",
                    response.question_id, response.session_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_responses(&self, session_id: &str) -> Result<Vec<Response>, StorageError> {
        #[derive(FromRow)]
        struct ResponseRow {
            id: String,
            session_id: String,
            question_id: i64,
            question_text: String,
            answer: String,
            answered_at: String,
            time_spent: Option<i64>,
            token_count: Option<i64>,
            char_count: Option<i64>,
        }

        let rows: Vec<ResponseRow> = sqlx::query_as(
            "SELECT id, session_id, question_id, question_text, answer, answered_at, \
             time_spent, token_count, char_count FROM responses \
             WHERE session_id = ? ORDER BY question_id ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Response {
                id: r.id,
                session_id: r.session_id,
                question_id: r.question_id as u32,
                question_text: r.question_text,
                answer: r.answer,
                answered_at: r.answered_at,
                time_spent: r.time_spent.map(|v| v as u32),
                token_count: r.token_count.map(|v| v as u32),
                char_count: r.char_count.map(|v| v as u32),
            })
            .collect())
    }

    /// Replace a session's reports atomically (delete-then-insert).
    ///
    /// Re-delivering the same payload yields the same rows, which makes
    /// terminal webhook delivery idempotent.
    pub async fn replace_reports(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        reports: &[(ReportType, Visibility, String)],
        created_at: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM reports WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        for (report_type, visibility, content) in reports {
            sqlx::query(
                "INSERT INTO reports (id, session_id, user_id, type, content, visibility, \
                 created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(session_id)
            .bind(user_id)
            .bind(report_type.as_str())
            .bind(content)
            .bind(visibility.as_str())
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_reports(&self, session_id: &str) -> Result<Vec<Report>, StorageError> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            "SELECT id, session_id, user_id, type AS report_type, content, visibility, \
             created_at FROM reports WHERE session_id = ? ORDER BY type ASC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
