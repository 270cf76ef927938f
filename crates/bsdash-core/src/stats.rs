//! Aggregate counts and run timing shown in the dashboard header.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::StatusDocument;
use crate::status::{StageCode, SubjectStatus};

/// Subject counts per status bucket.
///
/// `finished`, `running`, `queued`, `pending` and `other` partition the
/// reported subjects; `error` is counted independently, so a subject with one
/// stage running and another errored shows up in both `running` and `error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub reported: usize,
    pub total: usize,
    pub finished: usize,
    pub running: usize,
    pub error: usize,
    pub queued: usize,
    pub pending: usize,
    pub other: usize,
}

impl StatusCounts {
    pub fn tally(statuses: &[SubjectStatus], total: usize) -> Self {
        let mut counts = StatusCounts {
            total,
            ..Default::default()
        };
        for status in statuses {
            match status {
                SubjectStatus::Unavailable => continue,
                SubjectStatus::Malformed { .. } => counts.other += 1,
                SubjectStatus::Known { codes } => {
                    let has = |code| codes.codes().contains(&code);
                    if codes.get(0) == Some(StageCode::Pending) {
                        counts.pending += 1;
                    } else if codes
                        .codes()
                        .iter()
                        .all(|c| matches!(c, StageCode::Completed | StageCode::NotRun))
                    {
                        counts.finished += 1;
                    } else if has(StageCode::Launched) {
                        counts.running += 1;
                    } else if has(StageCode::Queued) {
                        counts.queued += 1;
                    } else {
                        counts.other += 1;
                    }
                    if has(StageCode::Error) {
                        counts.error += 1;
                    }
                }
            }
            counts.reported += 1;
        }
        counts
    }

    pub fn summary_line(&self) -> String {
        format!(
            "finished: {} running: {} error: {} queued: {} pending: {}",
            self.finished, self.running, self.error, self.queued, self.pending
        )
    }
}

/// Timing and lifecycle information from the last applied status document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub start_time: Option<String>,
    pub update_time: Option<String>,
    pub runtime: Option<String>,
    pub producer_status: Option<String>,
    pub ended: bool,
}

impl RunInfo {
    pub fn from_document(doc: &StatusDocument) -> Self {
        Self {
            start_time: doc.start_time.as_ref().and_then(format_timestamp),
            update_time: doc.update_time.as_ref().and_then(format_timestamp),
            runtime: doc.runtime.as_ref().and_then(value_text),
            producer_status: doc.status.as_ref().and_then(value_text),
            ended: doc.end,
        }
    }

    pub fn state_text(&self) -> &'static str {
        if self.ended {
            "processing has concluded"
        } else {
            "processing is active"
        }
    }
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Render a producer timestamp in local time. Numbers are epoch milliseconds;
/// strings are RFC 3339 or `YYYY-MM-DD HH:MM:SS` and anything else is kept
/// verbatim.
pub fn format_timestamp(value: &serde_json::Value) -> Option<String> {
    const DISPLAY: &str = "%Y-%m-%d %H:%M:%S";
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.with_timezone(&Local).format(DISPLAY).to_string()),
        serde_json::Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                Some(dt.with_timezone(&Local).format(DISPLAY).to_string())
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, DISPLAY) {
                Some(naive.format(DISPLAY).to_string())
            } else {
                Some(s.clone())
            }
        }
        other => value_text(other),
    }
}

/// Format seconds as a short human duration.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
