#![forbid(unsafe_code)]

//! `lanefarm`: render job orchestrator binary.
//!
//! Loads the configuration and job list, splits the jobs across worker
//! lanes, and runs the session until every lane finishes, fails, or a
//! shutdown signal arrives.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use lanefarm::cli::{self, Cli, LogFormat};
use lanefarm::command::TemplateCommand;
use lanefarm::config::GlobalConfig;
use lanefarm::models::job;
use lanefarm::orchestrator::session_coordinator::{SessionCoordinator, SessionSummary};
use lanefarm::progress;
use lanefarm::{AppError, Result};

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    args.apply_overrides(&mut config)?;

    init_tracing(args.log_format, cli::log_file(&config).as_deref())?;
    info!(
        lanes = config.lanes,
        max_per_batch = config.max_per_batch,
        output_dir = %config.output_dir.display(),
        "configuration loaded"
    );

    let summary = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(&args, &config))?;

    let code = cli::exit_code(&summary);
    if code == cli::EXIT_PARTIAL_FAILURE {
        warn!(lanes = ?summary.failed_lanes, "session finished with failed lanes");
    }
    Ok(ExitCode::from(code))
}

async fn run(args: &Cli, config: &GlobalConfig) -> Result<SessionSummary> {
    // ── Load jobs ───────────────────────────────────────
    let jobs = job::load_jobs(&args.jobs)?;
    info!(count = jobs.len(), "jobs loaded");

    // ── Build session ───────────────────────────────────
    let command = Arc::new(TemplateCommand::new(config.command.clone()));
    let mut session = SessionCoordinator::new(config, &jobs, command)?
        .with_display(progress::for_stderr(cli::wants_progress(config)));

    // ── Wire shutdown signal ────────────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let summary = session.run(ct).await?;
    signal_handle.abort();

    info!(report = %summary.report_path.display(), "lanefarm finished");
    Ok(summary)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let writer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|err| {
                    AppError::Io(format!("failed to create {}: {err}", dir.display()))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    AppError::Io(format!("failed to open log file {}: {err}", path.display()))
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_ansi(log_file.is_none())
        .with_writer(writer);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
