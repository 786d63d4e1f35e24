//! Job descriptors, batches and jobs-file loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Opaque unit of work understood only by the external render command.
///
/// The orchestrator never looks inside a descriptor; it counts them and
/// hands them to the command template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct JobDescriptor(pub serde_json::Value);

impl JobDescriptor {
    /// Render the descriptor as a single command-line argument.
    ///
    /// Strings are passed verbatim, everything else as compact JSON.
    #[must_use]
    pub fn as_arg(&self) -> String {
        match &self.0 {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<&str> for JobDescriptor {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::String(value.to_owned()))
    }
}

impl From<String> for JobDescriptor {
    fn from(value: String) -> Self {
        Self(serde_json::Value::String(value))
    }
}

/// Ordered, size-bounded chunk of jobs run by one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Lane the batch belongs to.
    pub lane: usize,
    /// Zero-based position within the lane.
    pub index: usize,
    /// Jobs in execution order.
    pub jobs: Vec<JobDescriptor>,
}

impl Batch {
    /// Number of jobs in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the batch holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Load the session's job list.
///
/// A `.json` file must contain an array of descriptors. Any other file is
/// read as one string descriptor per non-empty line.
///
/// # Errors
///
/// Returns `AppError::Jobs` if the file cannot be read or is not a JSON
/// array.
pub fn load_jobs(path: &Path) -> Result<Vec<JobDescriptor>> {
    let raw = fs::read_to_string(path).map_err(|err| {
        AppError::Jobs(format!("failed to read jobs file {}: {err}", path.display()))
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        parse_json_jobs(&raw)
    } else {
        Ok(parse_line_jobs(&raw))
    }
}

/// Parse a JSON array of job descriptors.
///
/// # Errors
///
/// Returns `AppError::Jobs` if `raw` is not a JSON array.
pub fn parse_json_jobs(raw: &str) -> Result<Vec<JobDescriptor>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(JobDescriptor).collect()),
        _ => Err(AppError::Jobs("jobs file must contain a JSON array".into())),
    }
}

/// Parse one string job per non-empty, non-comment line.
#[must_use]
pub fn parse_line_jobs(raw: &str) -> Vec<JobDescriptor> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(JobDescriptor::from)
        .collect()
}
