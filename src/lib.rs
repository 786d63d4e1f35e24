#![forbid(unsafe_code)]

//! `lanefarm`: fan a large render workload out over parallel worker
//! processes, watch their logs for progress, restart stalled workers and
//! keep an ETA report up to date.

pub mod cli;
pub mod command;
pub mod config;
pub mod errors;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod report;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
