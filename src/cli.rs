//! Command-line arguments and process exit codes.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::GlobalConfig;
use crate::orchestrator::session_coordinator::SessionSummary;
use crate::progress;
use crate::Result;

/// Exit code when one or more lanes exhausted their restarts.
pub const EXIT_PARTIAL_FAILURE: u8 = 2;
/// Exit code when the session was interrupted by a signal.
pub const EXIT_CANCELLED: u8 = 130;

/// Name of the log file used while the progress display owns stderr.
const LOG_FILE_NAME: &str = "lanefarm.log";

/// Log line format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Parallel render job orchestrator.
#[derive(Debug, Parser)]
#[command(name = "lanefarm", about = "Parallel render job orchestrator", version, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    pub config: PathBuf,

    /// Jobs file: a JSON array, or one job per line.
    #[arg(long)]
    pub jobs: PathBuf,

    /// Override the output directory for logs and reports.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Override the number of parallel lanes.
    #[arg(long)]
    pub lanes: Option<usize>,

    /// Override the largest batch handed to one worker process.
    #[arg(long)]
    pub max_per_batch: Option<usize>,

    /// Stream worker output to the console instead of per-lane logs.
    #[arg(long)]
    pub to_stdout: bool,

    /// Disable the interactive progress display.
    #[arg(long)]
    pub no_progress: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config and
    /// re-validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override breaks a config invariant,
    /// such as `--lanes 0`.
    pub fn apply_overrides(&self, config: &mut GlobalConfig) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(lanes) = self.lanes {
            config.lanes = lanes;
        }
        if let Some(max) = self.max_per_batch {
            config.max_per_batch = max;
        }
        if self.to_stdout {
            config.to_stdout = true;
        }
        if self.no_progress {
            config.progress_display = false;
        }
        config.validate()
    }
}

/// Whether the session should try to draw progress bars. Console mode
/// writes worker output to the terminal, so bars would fight it.
#[must_use]
pub fn wants_progress(config: &GlobalConfig) -> bool {
    config.progress_display && !config.to_stdout
}

/// File that receives log output, or `None` for stderr.
///
/// Logs move to `<output_dir>/lanefarm.log` whenever the progress display
/// will be redrawing stderr in place.
#[must_use]
pub fn log_file(config: &GlobalConfig) -> Option<PathBuf> {
    progress::terminal_enabled(wants_progress(config))
        .then(|| config.output_dir.join(LOG_FILE_NAME))
}

/// Process exit code for a finished session: cancellation wins over lane
/// failures.
#[must_use]
pub fn exit_code(summary: &SessionSummary) -> u8 {
    if summary.cancelled {
        EXIT_CANCELLED
    } else if summary.failed_lanes.is_empty() {
        0
    } else {
        EXIT_PARTIAL_FAILURE
    }
}
