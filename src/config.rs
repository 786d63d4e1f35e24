//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// External render command template.
///
/// Arguments and environment values may contain the placeholders
/// `{jobs_file}`, `{lane}`, `{batch}` and `{job_count}`. An argument that is
/// exactly `{jobs}` expands to one argument per job in the batch.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandConfig {
    /// Executable to launch for every batch (e.g., `blender`).
    pub program: String,
    /// Argument template passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the worker process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the worker; inherits ours when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Polling, reporting and recovery timings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimingConfig {
    /// Interval between coordinator polls.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    /// Interval between report file rewrites.
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
    /// Longest time a lane may go without a new progress marker.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_seconds: u64,
    /// Restarts allowed per batch before the lane is marked failed.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Time a worker gets to exit after SIGTERM on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            report_interval_seconds: default_report_interval(),
            stall_timeout_seconds: default_stall_timeout(),
            max_restarts: default_max_restarts(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

impl TimingConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Report interval as a [`Duration`].
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_seconds)
    }

    /// Stall timeout as a [`Duration`].
    #[must_use]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_seconds)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

fn default_tick_millis() -> u64 {
    500
}

fn default_report_interval() -> u64 {
    15
}

fn default_stall_timeout() -> u64 {
    100
}

fn default_max_restarts() -> u32 {
    3
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("renders")
}

fn default_lanes() -> usize {
    1
}

fn default_max_per_batch() -> usize {
    100
}

fn default_progress_marker() -> String {
    "RENDERED:".into()
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `lanefarm.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory receiving the `logs/` tree and report files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of parallel worker lanes.
    #[serde(default = "default_lanes")]
    pub lanes: usize,
    /// Largest number of jobs handed to one worker process.
    #[serde(default = "default_max_per_batch")]
    pub max_per_batch: usize,
    /// Prefix of the line a worker prints for every finished job.
    #[serde(default = "default_progress_marker")]
    pub progress_marker: String,
    /// Send worker output to the console instead of per-lane log files.
    #[serde(default)]
    pub to_stdout: bool,
    /// Draw interactive progress bars when stderr is a terminal.
    #[serde(default = "default_true")]
    pub progress_display: bool,
    /// External render command template.
    pub command: CommandConfig,
    /// Poll, report and recovery timings.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the orchestrator relies on.
    ///
    /// Call again after applying command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.lanes == 0 {
            return Err(AppError::Config("lanes must be greater than zero".into()));
        }

        if self.max_per_batch == 0 {
            return Err(AppError::Config(
                "max_per_batch must be greater than zero".into(),
            ));
        }

        if self.progress_marker.is_empty() {
            return Err(AppError::Config("progress_marker must not be empty".into()));
        }

        if self.command.program.trim().is_empty() {
            return Err(AppError::Config("command.program must not be empty".into()));
        }

        if self.timing.tick_millis == 0 {
            return Err(AppError::Config(
                "timing.tick_millis must be greater than zero".into(),
            ));
        }

        if self.timing.stall_timeout_seconds == 0 {
            return Err(AppError::Config(
                "timing.stall_timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
