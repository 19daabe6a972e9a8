// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-run progress log and the structured run dump.
//!
//! Live viewers poll the progress file with a line offset; the dump JSON
//! is written once at finalize. Logging failures never break the run —
//! they are reported via tracing and dropped.

use pw_core::api::ProgressPage;
use pw_core::{format_elapsed_ms, format_epoch_ms};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writer for one run's progress stream.
pub struct ProgressLogger {
    path: PathBuf,
}

/// `<log_dir>/executions/<project>_<job>_<timestamp>_progress.log`
fn progress_path(log_dir: &Path, project: &str, job_key: &str, started_at_ms: u64) -> PathBuf {
    log_dir
        .join("executions")
        .join(format!("{}_{}_{}_progress.log", sanitize(project), job_key, started_at_ms))
}

/// Dump path next to the progress log: same stem, `.json`.
fn dump_path(log_dir: &Path, project: &str, job_key: &str, started_at_ms: u64) -> PathBuf {
    log_dir
        .join("executions")
        .join(format!("{}_{}_{}.json", sanitize(project), job_key, started_at_ms))
}

/// File-name-safe project label.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl ProgressLogger {
    /// Create the writer for one run (the file appears on first append).
    pub fn create(log_dir: &Path, project: &str, job_key: &str, started_at_ms: u64) -> Self {
        Self {
            path: progress_path(log_dir, project, job_key, started_at_ms),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one node-termination line:
    ///
    /// `<ISO8601> | <✅|❌> <STATUS> | <label> (<id>) | Duration: <d> | Progress: <done>/<total> (<pct>%)[ <error>]`
    #[allow(clippy::too_many_arguments)]
    pub fn node_line(
        &self,
        now_ms: u64,
        ok: bool,
        label: &str,
        node_id: &str,
        duration_ms: u64,
        done: u32,
        total: u32,
        error: Option<&str>,
    ) {
        let marker = if ok { "✅ COMPLETED" } else { "❌ FAILED" };
        let pct = if total == 0 { 0 } else { done * 100 / total };
        let mut line = format!(
            "{} | {} | {} ({}) | Duration: {} | Progress: {}/{} ({}%)",
            format_epoch_ms(now_ms),
            marker,
            label,
            node_id,
            format_elapsed_ms(duration_ms),
            done,
            total,
            pct,
        );
        if let Some(error) = error {
            let excerpt: String = error.chars().take(160).collect();
            line.push(' ');
            line.push_str(&excerpt.replace('\n', " "));
        }
        self.append(&line);
    }

    fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write progress log");
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Write the structured dump next to the progress log.
    pub fn write_dump(
        &self,
        log_dir: &Path,
        project: &str,
        job_key: &str,
        started_at_ms: u64,
        dump: &serde_json::Value,
    ) {
        let path = dump_path(log_dir, project, job_key, started_at_ms);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, serde_json::to_string_pretty(dump).unwrap_or_default())
        };
        if let Err(e) = write() {
            tracing::warn!(path = %path.display(), error = %e, "failed to write execution dump");
        }
    }
}

/// Read a job's progress lines from `offset` onward.
///
/// The newest progress file for the job is selected; a missing file reads
/// as empty. Readers tolerate truncation by re-reading from offset 0.
pub fn read_progress(log_dir: &Path, job_key: &str, offset: usize) -> ProgressPage {
    let Some(path) = find_latest(log_dir, job_key) else {
        return ProgressPage {
            lines: Vec::new(),
            total: 0,
        };
    };
    let content = fs::read_to_string(path).unwrap_or_default();
    let all: Vec<&str> = content.lines().collect();
    let total = all.len();
    let lines = all
        .into_iter()
        .skip(offset.min(total))
        .map(str::to_string)
        .collect();
    ProgressPage { lines, total }
}

fn find_latest(log_dir: &Path, job_key: &str) -> Option<PathBuf> {
    let needle = format!("_{}_", job_key);
    let dir = log_dir.join("executions");
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.contains(&needle) && n.ends_with("_progress.log"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.pop()
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
