//! External render command template.
//!
//! The orchestrator never knows what a render job is. It asks a
//! [`CommandBuilder`] to bind a batch into a concrete process invocation and
//! runs whatever comes back.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CommandConfig;
use crate::models::job::{Batch, JobDescriptor};
use crate::{AppError, Result};

/// Environment variable carrying the zero-based lane index.
pub const ENV_LANE: &str = "LANEFARM_LANE";
/// Environment variable carrying the zero-based batch index.
pub const ENV_BATCH: &str = "LANEFARM_BATCH";
/// Environment variable carrying the path of the batch's jobs file.
pub const ENV_JOBS_FILE: &str = "LANEFARM_JOBS_FILE";

/// A fully bound process invocation for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to launch.
    pub program: String,
    /// Arguments after placeholder expansion.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory, if not inherited.
    pub working_dir: Option<PathBuf>,
}

/// Binds a batch's jobs into an executable invocation.
pub trait CommandBuilder: Send + Sync {
    /// Build the invocation for `batch`. `scratch_dir` is a session-owned
    /// directory where per-batch inputs may be written.
    ///
    /// # Errors
    ///
    /// Returns an error if per-batch inputs cannot be prepared.
    fn set_job(&self, batch: &Batch, scratch_dir: &Path) -> Result<Invocation>;
}

/// [`CommandBuilder`] driven by the `[command]` section of the config.
#[derive(Debug, Clone)]
pub struct TemplateCommand {
    config: CommandConfig,
}

impl TemplateCommand {
    /// Wrap a command template.
    #[must_use]
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Path of the jobs file written for `batch` inside `scratch_dir`.
    #[must_use]
    pub fn jobs_file_path(batch: &Batch, scratch_dir: &Path) -> PathBuf {
        scratch_dir.join(format!("jobs_{:02}_{:03}.json", batch.lane, batch.index))
    }

    fn expand(template: &str, batch: &Batch, jobs_file: &str) -> String {
        template
            .replace("{jobs_file}", jobs_file)
            .replace("{lane}", &batch.lane.to_string())
            .replace("{batch}", &batch.index.to_string())
            .replace("{job_count}", &batch.len().to_string())
    }
}

impl CommandBuilder for TemplateCommand {
    fn set_job(&self, batch: &Batch, scratch_dir: &Path) -> Result<Invocation> {
        let jobs_file = Self::jobs_file_path(batch, scratch_dir);
        let payload = serde_json::to_string_pretty(&batch.jobs)
            .map_err(|err| AppError::Spawn(format!("failed to encode batch jobs: {err}")))?;
        fs::write(&jobs_file, payload).map_err(|err| {
            AppError::Io(format!(
                "failed to write jobs file {}: {err}",
                jobs_file.display()
            ))
        })?;
        let jobs_file = jobs_file.to_string_lossy().into_owned();

        let mut args = Vec::with_capacity(self.config.args.len() + batch.len());
        for arg in &self.config.args {
            if arg == "{jobs}" {
                args.extend(batch.jobs.iter().map(JobDescriptor::as_arg));
            } else {
                args.push(Self::expand(arg, batch, &jobs_file));
            }
        }

        let mut env: Vec<(String, String)> = self
            .config
            .env
            .iter()
            .map(|(key, value)| (key.clone(), Self::expand(value, batch, &jobs_file)))
            .collect();
        env.sort();
        env.push((ENV_LANE.into(), batch.lane.to_string()));
        env.push((ENV_BATCH.into(), batch.index.to_string()));
        env.push((ENV_JOBS_FILE.into(), jobs_file));

        Ok(Invocation {
            program: self.config.program.clone(),
            args,
            env,
            working_dir: self.config.working_dir.clone(),
        })
    }
}
