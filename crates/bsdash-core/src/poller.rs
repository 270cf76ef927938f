//! Status polling: where status documents come from and which of them may be
//! applied.
//!
//! Fetches run off the engine task and may complete out of order. Every fetch
//! is tagged with a sequence number when it is issued; the [`PollSequencer`]
//! accepts a result only if it is newer than everything applied so far.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::documents::{self, StatusDocument, STATUS_FILE};
use crate::error::Result;
use crate::render::PollHealth;

/// A place status documents can be read from.
///
/// `fetch` is blocking; the engine runs it on the blocking thread pool.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch(&self) -> Result<StatusDocument>;

    /// Short human description for logs.
    fn describe(&self) -> String;
}

/// Reads `brainsuite_state.json` from a QC directory.
#[derive(Debug, Clone)]
pub struct FileStatusSource {
    path: PathBuf,
}

impl FileStatusSource {
    pub fn new(qc_dir: impl AsRef<Path>) -> Self {
        Self {
            path: qc_dir.as_ref().join(STATUS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusSource for FileStatusSource {
    fn fetch(&self) -> Result<StatusDocument> {
        documents::load_json(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Outcome of offering a poll result to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollVerdict {
    Apply,
    /// A newer result has already been applied.
    Stale,
}

/// Issues sequence numbers and tracks poll health.
#[derive(Debug, Default)]
pub struct PollSequencer {
    issued: u64,
    health: PollHealth,
}

impl PollSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for a fetch about to be issued.
    pub fn next_seq(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn last_applied(&self) -> u64 {
        self.health.last_applied
    }

    pub fn health(&self) -> &PollHealth {
        &self.health
    }

    /// Record a finished fetch. Stale results are dropped whether they
    /// succeeded or failed.
    pub fn accept<T>(&mut self, seq: u64, result: &Result<T>) -> PollVerdict {
        if seq <= self.health.last_applied {
            debug!(seq, last_applied = self.health.last_applied, "Discarding stale poll result");
            return PollVerdict::Stale;
        }
        self.health.last_applied = seq;
        match result {
            Ok(_) => {
                self.health.consecutive_failures = 0;
                self.health.last_error = None;
            }
            Err(e) => {
                self.health.consecutive_failures += 1;
                self.health.last_error = Some(e.to_string());
                warn!(
                    seq,
                    failures = self.health.consecutive_failures,
                    "Status poll failed: {}",
                    e
                );
            }
        }
        PollVerdict::Apply
    }
}
