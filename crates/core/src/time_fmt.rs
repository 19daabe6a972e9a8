// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp and duration formatting shared by logs and wire payloads.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format an epoch-millisecond timestamp as RFC 3339 UTC with second
/// precision, e.g. `2026-01-30T08:14:09Z`.
pub fn format_epoch_ms(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// Human-readable elapsed duration from milliseconds.
///
/// `350ms`, `1.2s`, `2m05s`, `1h03m`.
pub fn format_elapsed_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else if ms < 3_600_000 {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1_000;
        format!("{}m{:02}s", mins, secs)
    } else {
        let hours = ms / 3_600_000;
        let mins = (ms % 3_600_000) / 60_000;
        format!("{}h{:02}m", hours, mins)
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
