//! Session report text and atomic report writing.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// 12-hour clock plus day/month/year, e.g. `03:04 PM 16/10/26`.
const CLOCK_FORMAT: &str = "%I:%M %p %d/%m/%y";

/// Snapshot of session progress used to build a report.
#[derive(Debug, Clone)]
pub struct ReportInput {
    /// Jobs reported complete across all lanes.
    pub completed: usize,
    /// Total jobs in the session.
    pub total: usize,
    /// Wall-clock time since the session started.
    pub elapsed: Duration,
    /// Local time the session started.
    pub session_start: DateTime<Local>,
    /// Local time the report is generated.
    pub now: DateTime<Local>,
    /// Lanes that exhausted their restart budget.
    pub failed_lanes: Vec<usize>,
}

impl ReportInput {
    /// Average seconds spent per completed job, `None` before the first one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds_per_job(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.elapsed.as_secs_f64() / self.completed as f64)
    }

    /// Projected completion time: `now + remaining * elapsed / completed`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn estimated_end(&self) -> Option<DateTime<Local>> {
        let per_job = self.seconds_per_job()?;
        let remaining = self.total.saturating_sub(self.completed) as f64;
        let millis = (remaining * per_job * 1000.0).round();
        if !millis.is_finite() {
            return None;
        }
        let wait = Duration::from_millis(millis.max(0.0) as u64);
        let wait = chrono::Duration::from_std(wait).ok()?;
        self.now.checked_add_signed(wait)
    }
}

/// Render the report text.
///
/// The numeric block is left out until at least one job has completed, so
/// no rate or ETA is ever derived from a zero count. Permanently failed
/// lanes are listed regardless.
#[must_use]
pub fn render_report(input: &ReportInput) -> String {
    let mut report = match (input.seconds_per_job(), input.estimated_end()) {
        (Some(per_job), Some(eta)) => format!(
            "Number of images rendered: {}\n\
             Total session quota: {}\n\
             Time elapsed: {}\n\
             Time per render (s): {per_job:.2}\n\n\
             Session start: {}\n\
             Estimated End: {}",
            input.completed,
            input.total,
            format_elapsed(input.elapsed),
            input.session_start.format(CLOCK_FORMAT),
            eta.format(CLOCK_FORMAT),
        ),
        _ => String::new(),
    };

    if !input.failed_lanes.is_empty() {
        let lanes = input
            .failed_lanes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if !report.is_empty() {
            report.push_str("\n\n");
        }
        report.push_str(&format!("Failed lanes: {lanes} (restart limit reached)"));
    }

    report
}

/// Format a duration as `H:MM:SS`, rounded to the nearest second, with a
/// `N day(s), ` prefix past 24 hours.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    if elapsed.subsec_millis() >= 500 {
        secs += 1;
    }

    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    let clock = format!("{hours}:{minutes:02}:{seconds:02}");

    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

/// Replace the report at `path` with `contents` in one rename.
///
/// # Errors
///
/// Returns `AppError::Report` if the temporary file cannot be written or
/// renamed over `path`.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Report("report path has no parent directory".into()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Report(format!("failed to create temporary file: {err}")))?;

    tmp.write_all(contents.as_bytes())
        .map_err(|err| AppError::Report(format!("failed to write temporary file: {err}")))?;

    tmp.persist(path).map_err(|err| {
        AppError::Report(format!(
            "failed to persist report to {}: {err}",
            path.display()
        ))
    })?;

    Ok(())
}
