//! On-disk layout of one session.
//!
//! ```text
//! <output_dir>/
//!   report_<NN>.txt
//!   logs/<yymmdd-HHMMSS>/
//!     log_<lane>.txt
//!     jobs_<lane>_<batch>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::{AppError, Result};

/// Paths owned by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    /// Root directory for everything the session writes.
    pub output_dir: PathBuf,
    /// Timestamped directory holding lane logs and batch job files.
    pub log_dir: PathBuf,
    /// Report file rewritten during the session.
    pub report_path: PathBuf,
}

impl SessionLayout {
    /// Create the log directory for a session started at `started` and pick
    /// the next free report path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directories cannot be created or the
    /// output directory cannot be listed.
    pub fn create(output_dir: &Path, started: DateTime<Local>) -> Result<Self> {
        let session_name = started.format("%y%m%d-%H%M%S").to_string();
        let log_dir = output_dir.join("logs").join(session_name);
        fs::create_dir_all(&log_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create log directory {}: {err}",
                log_dir.display()
            ))
        })?;

        let report_path = next_report_path(output_dir)?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            log_dir,
            report_path,
        })
    }

    /// Log file for `lane`, named by its two-digit index.
    #[must_use]
    pub fn lane_log_path(&self, lane: usize) -> PathBuf {
        self.log_dir.join(format!("log_{lane:02}.txt"))
    }
}

/// First `report_<NN>.txt` in `output_dir` that does not exist yet.
///
/// Numbering starts at the count of existing report files so repeated
/// sessions keep a readable sequence, then skips forward past any gap.
///
/// # Errors
///
/// Returns `AppError::Io` if `output_dir` cannot be listed.
pub fn next_report_path(output_dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(output_dir).map_err(|err| {
        AppError::Io(format!(
            "failed to list output directory {}: {err}",
            output_dir.display()
        ))
    })?;

    let existing = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("report_"))
        .count();

    let mut index = existing;
    loop {
        let candidate = output_dir.join(format!("report_{index:02}.txt"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}
