// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report artifacts and the canonical name mapping.
//!
//! A finished pipeline hands back three named report texts; the names, their
//! stored types, and their visibility levels are a fixed contract with the
//! front-end.

use serde::{Deserialize, Serialize};

/// Canonical report names as produced by pipelines, in delivery order.
pub const CANONICAL_REPORT_NAMES: [&str; 3] = [
    "Adapted Report",
    "Professional Report",
    "Aggregate Score Profile",
];

/// Stored report type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "ADAPTED")]
    Adapted,
    #[serde(rename = "FULL")]
    Full,
    #[serde(rename = "SCORE_TABLE")]
    ScoreTable,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Adapted => "ADAPTED",
            ReportType::Full => "FULL",
            ReportType::ScoreTable => "SCORE_TABLE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADAPTED" => Some(ReportType::Adapted),
            "FULL" => Some(ReportType::Full),
            "SCORE_TABLE" => Some(ReportType::ScoreTable),
            _ => None,
        }
    }

    /// Map a canonical report name to its stored type.
    pub fn from_report_name(name: &str) -> Option<Self> {
        match name {
            "Adapted Report" => Some(ReportType::Adapted),
            "Professional Report" => Some(ReportType::Full),
            "Aggregate Score Profile" => Some(ReportType::ScoreTable),
            _ => None,
        }
    }

    /// Visibility assigned at delivery time.
    pub fn default_visibility(&self) -> Visibility {
        match self {
            ReportType::Adapted => Visibility::Private,
            ReportType::Full | ReportType::ScoreTable => Visibility::Restricted,
        }
    }
}

/// Who may read a stored report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    #[serde(rename = "PUBLIC")]
    Public,
    #[serde(rename = "PRIVATE")]
    Private,
    #[serde(rename = "RESTRICTED")]
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Private => "PRIVATE",
            Visibility::Restricted => "RESTRICTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PUBLIC" => Some(Visibility::Public),
            "PRIVATE" => Some(Visibility::Private),
            "RESTRICTED" => Some(Visibility::Restricted),
            _ => None,
        }
    }
}

/// A terminal artifact bound to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub session_id: String,
    pub user_id: Option<String>,
    pub report_type: ReportType,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: String,
}
