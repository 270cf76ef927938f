//! Status interpreter: stage codes, status strings and their classification.
//!
//! Everything here is a pure function of its inputs. Classification keeps the
//! tie-break order pending, finished, queued-not-running, then a running/error
//! scan.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{DashError, Result};

/// Status of one pipeline stage for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageCode {
    Pending,
    Queued,
    Launched,
    Completed,
    Error,
    NotRun,
}

impl StageCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' | 'P' => Some(StageCode::Pending),
            'Q' => Some(StageCode::Queued),
            'L' => Some(StageCode::Launched),
            'C' => Some(StageCode::Completed),
            'E' => Some(StageCode::Error),
            'U' => Some(StageCode::NotRun),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            StageCode::Pending => 'N',
            StageCode::Queued => 'Q',
            StageCode::Launched => 'L',
            StageCode::Completed => 'C',
            StageCode::Error => 'E',
            StageCode::NotRun => 'U',
        }
    }

    /// Word used in tooltips and tile captions.
    pub fn label(self) -> &'static str {
        match self {
            StageCode::Pending => "pending",
            StageCode::Queued => "queued",
            StageCode::Launched => "running",
            StageCode::Completed => "completed",
            StageCode::Error => "error",
            StageCode::NotRun => "not run",
        }
    }
}

/// Ordered stage codes for one subject, one per stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusString(Vec<StageCode>);

impl StatusString {
    /// Parse and check the length against the stage catalog.
    pub fn parse(raw: &str, stage_count: usize) -> Result<Self> {
        let status: StatusString = raw.parse()?;
        if status.len() != stage_count {
            return Err(DashError::MalformedStatus(format!(
                "expected {} stage codes, found {}",
                stage_count,
                status.len()
            )));
        }
        Ok(status)
    }

    pub fn codes(&self) -> &[StageCode] {
        &self.0
    }

    pub fn get(&self, stage_index: usize) -> Option<StageCode> {
        self.0.get(stage_index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn all_in(&self, allowed: &[StageCode]) -> bool {
        self.0.iter().all(|c| allowed.contains(c))
    }

    fn contains(&self, code: StageCode) -> bool {
        self.0.contains(&code)
    }
}

impl FromStr for StatusString {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .enumerate()
            .map(|(pos, c)| {
                StageCode::from_char(c).ok_or_else(|| {
                    DashError::MalformedStatus(format!(
                        "unknown stage code '{}' at position {}",
                        c,
                        pos + 1
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(StatusString)
    }
}

impl fmt::Display for StatusString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{}", code.as_char())?;
        }
        Ok(())
    }
}

/// What the dashboard knows about one subject after a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SubjectStatus {
    Unavailable,
    Malformed { raw: String, reason: String },
    Known { codes: StatusString },
}

impl SubjectStatus {
    /// Interpret one raw entry of `process_states`.
    pub fn interpret(raw: Option<&str>, stage_count: usize) -> Self {
        match raw {
            None => SubjectStatus::Unavailable,
            Some(s) if s.is_empty() => SubjectStatus::Unavailable,
            Some(s) => match StatusString::parse(s, stage_count) {
                Ok(codes) => SubjectStatus::Known { codes },
                Err(e) => SubjectStatus::Malformed {
                    raw: s.to_string(),
                    reason: match e {
                        DashError::MalformedStatus(reason) => reason,
                        other => other.to_string(),
                    },
                },
            },
        }
    }

    pub fn codes(&self) -> Option<&StatusString> {
        match self {
            SubjectStatus::Known { codes } => Some(codes),
            _ => None,
        }
    }

    pub fn classify(&self) -> Classification {
        match self {
            SubjectStatus::Unavailable => Classification::Unavailable,
            SubjectStatus::Malformed { reason, .. } => Classification::Malformed {
                reason: reason.clone(),
            },
            SubjectStatus::Known { codes } => classify(codes),
        }
    }
}

/// Aggregate, human-facing reading of a status string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Classification {
    Unavailable,
    Malformed { reason: String },
    LaunchPending,
    Finished,
    Queued,
    /// Zero-based stage indices that are running or errored.
    Active { running: Vec<usize>, errors: Vec<usize> },
}

/// Classify a well-formed status string. First match wins.
pub fn classify(codes: &StatusString) -> Classification {
    use StageCode::*;

    if codes.is_empty() {
        return Classification::Unavailable;
    }
    if codes.get(0) == Some(Pending) {
        return Classification::LaunchPending;
    }
    if codes.all_in(&[Completed, NotRun]) {
        return Classification::Finished;
    }
    if codes.all_in(&[Queued, Completed, NotRun, Error]) && codes.contains(Queued) {
        return Classification::Queued;
    }

    let mut running = vec![];
    let mut errors = vec![];
    for (stage, code) in codes.codes().iter().enumerate() {
        match code {
            Launched => running.push(stage),
            Error => errors.push(stage),
            _ => {}
        }
    }
    Classification::Active { running, errors }
}

/// Text color class of a rendered fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Primary,
    Dark,
    Danger,
    Muted,
    Warning,
}

impl Tone {
    pub fn css_class(self) -> &'static str {
        match self {
            Tone::Success => "text-success",
            Tone::Primary => "text-primary",
            Tone::Dark => "text-dark",
            Tone::Danger => "text-danger",
            Tone::Muted => "text-muted",
            Tone::Warning => "text-warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFragment {
    pub tone: Tone,
    pub text: String,
}

impl SummaryFragment {
    fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

impl Classification {
    pub fn is_pending(&self) -> bool {
        matches!(self, Classification::LaunchPending)
    }

    /// Galleries are only drawn for subjects whose stages have been reported.
    pub fn has_stage_detail(&self) -> bool {
        matches!(
            self,
            Classification::Finished | Classification::Queued | Classification::Active { .. }
        )
    }

    /// Summary line fragments, using the catalog's stage names.
    pub fn summary(&self, catalog: &Catalog) -> Vec<SummaryFragment> {
        match self {
            Classification::Unavailable => {
                vec![SummaryFragment::new(Tone::Muted, "status unavailable.")]
            }
            Classification::Malformed { reason } => vec![SummaryFragment::new(
                Tone::Warning,
                format!("malformed status ({}).", reason),
            )],
            Classification::LaunchPending => {
                vec![SummaryFragment::new(Tone::Muted, "launch pending.")]
            }
            Classification::Finished => {
                vec![SummaryFragment::new(Tone::Success, "finished all stages.")]
            }
            Classification::Queued => vec![SummaryFragment::new(Tone::Dark, "queued to run.")],
            Classification::Active { running, errors } => {
                let mut fragments: Vec<SummaryFragment> = running
                    .iter()
                    .map(|&stage| {
                        SummaryFragment::new(
                            Tone::Primary,
                            format!("running {}.", catalog.stage_name(stage)),
                        )
                    })
                    .collect();
                if !errors.is_empty() {
                    let names: Vec<&str> =
                        errors.iter().map(|&stage| catalog.stage_name(stage)).collect();
                    fragments.push(SummaryFragment::new(
                        Tone::Danger,
                        format!("errors occurred running {}", names.join(", ")),
                    ));
                }
                fragments
            }
        }
    }
}

/// Join summary fragments into a single line.
pub fn summary_text(fragments: &[SummaryFragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The four glyphs drawn in a progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub completed: String,
    pub running: String,
    pub queued: String,
    pub error: String,
}

/// Glyph drawn for skipped stages when every stage is shown.
pub const NOT_RUN_GLYPH: &str = "🤖";

const PRESETS: &[(&str, [&str; 4])] = &[
    ("classic", ["🟢", "🔵", "⚪", "🔴"]),
    ("mono", ["⚫", "🔵", "⚪", "🔴"]),
    ("ocean", ["🔵", "🟠", "⚪", "🔴"]),
    ("hearts", ["💚", "💜", "💙", "💔"]),
    ("brain", ["🧠", "🏃", "🤷", "🔥"]),
    ("party", ["🎉", "🍿", "💤", "💣"]),
    ("squares", ["🟩", "🟨", "⬛", "🟥"]),
];

impl Default for ColorScheme {
    fn default() -> Self {
        Self::new("🟢", "🔵", "⚪", "🔴")
    }
}

impl ColorScheme {
    pub fn new(completed: &str, running: &str, queued: &str, error: &str) -> Self {
        Self {
            completed: completed.to_string(),
            running: running.to_string(),
            queued: queued.to_string(),
            error: error.to_string(),
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        PRESETS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, [c, l, q, e])| Self::new(c, l, q, e))
            .ok_or_else(|| DashError::UnknownScheme(name.to_string()))
    }

    pub fn preset_names() -> Vec<&'static str> {
        PRESETS.iter().map(|(n, _)| *n).collect()
    }

    /// Glyph for a per-stage code; `None` means nothing is drawn.
    pub fn glyph(&self, code: StageCode, show_all: bool) -> Option<&str> {
        match code {
            StageCode::Launched => Some(&self.running),
            StageCode::Error => Some(&self.error),
            StageCode::Queued => Some(&self.queued),
            StageCode::Completed => Some(&self.completed),
            StageCode::NotRun if show_all => Some(NOT_RUN_GLYPH),
            StageCode::NotRun | StageCode::Pending => None,
        }
    }
}

/// One symbol of a progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    pub stage: usize,
    pub code: StageCode,
    pub symbol: String,
    pub tooltip: String,
}

/// Per-stage glyphs for a status string. Launch-pending strings draw no bar.
pub fn progress_glyphs(
    codes: &StatusString,
    catalog: &Catalog,
    scheme: &ColorScheme,
    show_all: bool,
) -> Vec<Glyph> {
    if codes.get(0) == Some(StageCode::Pending) {
        return vec![];
    }
    codes
        .codes()
        .iter()
        .enumerate()
        .filter_map(|(stage, &code)| {
            scheme.glyph(code, show_all).map(|symbol| Glyph {
                stage,
                code,
                symbol: symbol.to_string(),
                tooltip: format!("{} - {}", catalog.stage_name(stage), code.label()),
            })
        })
        .collect()
}
