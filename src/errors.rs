//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Stalls and crashes of individual workers are lane states rather than
/// errors; they never surface here.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure (invalid lane count,
    /// batch size, command template).
    Config(String),
    /// Jobs file could not be read or parsed.
    Jobs(String),
    /// External render command could not be launched.
    Spawn(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Session report could not be written.
    Report(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Jobs(msg) => write!(f, "jobs: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Report(msg) => write!(f, "report: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Jobs(format!("invalid job descriptor: {err}"))
    }
}
