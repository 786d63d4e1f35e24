//! Session coordinator: owns every lane and drives the poll loop.
//!
//! One task wakes up every tick, aggregates progress across lanes, redraws
//! the progress display, rewrites the report on its own interval and lets
//! each unfinished lane advance or recover. Parallelism comes entirely from
//! the worker processes; nothing here is shared between threads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::command::CommandBuilder;
use crate::config::{GlobalConfig, TimingConfig};
use crate::layout::SessionLayout;
use crate::models::job::JobDescriptor;
use crate::models::lane::RecoveryReason;
use crate::orchestrator::splitter;
use crate::orchestrator::supervisor::{LaneSupervisor, SupervisorSettings};
use crate::orchestrator::worker::WorkerOutput;
use crate::progress::{HiddenProgress, LaneProgress, ProgressDisplay, ProgressSnapshot};
use crate::report::{self, ReportInput};
use crate::Result;

/// Outcome of a session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Jobs reported complete across all lanes.
    pub completed: usize,
    /// Jobs in the session.
    pub total: usize,
    /// Lanes that exhausted their restart budget.
    pub failed_lanes: Vec<usize>,
    /// Whether the run was stopped by cancellation.
    pub cancelled: bool,
    /// Report file written during the session.
    pub report_path: PathBuf,
}

impl SessionSummary {
    /// Every job completed, no lane failed and nothing was cancelled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_lanes.is_empty() && self.completed >= self.total
    }
}

/// Owns all lanes of one session.
pub struct SessionCoordinator {
    lanes: Vec<LaneSupervisor>,
    layout: SessionLayout,
    timing: TimingConfig,
    display: Box<dyn ProgressDisplay>,
    total_jobs: usize,
    session_start: DateTime<Local>,
    started_at: Instant,
}

impl SessionCoordinator {
    /// Split `jobs` into lanes and batches, create the session's directory
    /// layout and open one log per lane.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a zero lane count or batch size and
    /// `AppError::Io` if the layout or a lane log cannot be created.
    pub fn new(
        config: &GlobalConfig,
        jobs: &[JobDescriptor],
        command: Arc<dyn CommandBuilder>,
    ) -> Result<Self> {
        let plan = splitter::plan_lanes(jobs, config.lanes, config.max_per_batch)?;
        let session_start = Local::now();
        let layout = SessionLayout::create(&config.output_dir, session_start)?;

        let settings = SupervisorSettings {
            progress_marker: config.progress_marker.clone(),
            stall_timeout: config.timing.stall_timeout(),
            max_restarts: config.timing.max_restarts,
        };

        let mut lanes = Vec::with_capacity(plan.len());
        for (lane, batches) in plan.into_iter().enumerate() {
            let output = if config.to_stdout {
                WorkerOutput::Console
            } else {
                WorkerOutput::open_log(&layout.lane_log_path(lane))?
            };
            lanes.push(LaneSupervisor::new(
                lane,
                batches,
                Arc::clone(&command),
                layout.log_dir.clone(),
                output,
                settings.clone(),
            ));
        }

        Ok(Self {
            lanes,
            layout,
            timing: config.timing.clone(),
            display: Box::new(HiddenProgress),
            total_jobs: jobs.len(),
            session_start,
            started_at: Instant::now(),
        })
    }

    /// Replace the progress display.
    #[must_use]
    pub fn with_display(mut self, display: Box<dyn ProgressDisplay>) -> Self {
        self.display = display;
        self
    }

    /// Directory layout of this session.
    #[must_use]
    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// Lane supervisors in lane order.
    #[must_use]
    pub fn lanes(&self) -> &[LaneSupervisor] {
        &self.lanes
    }

    /// Total jobs in the session; constant for its whole lifetime.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_jobs
    }

    /// Whether the session has no jobs at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_jobs == 0
    }

    /// Jobs completed across all lanes.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.lanes.iter().map(LaneSupervisor::completed_count).sum()
    }

    /// Lanes that exhausted their restart budget.
    #[must_use]
    pub fn failed_lanes(&self) -> Vec<usize> {
        self.lanes
            .iter()
            .filter(|lane| lane.has_failed())
            .map(LaneSupervisor::lane)
            .collect()
    }

    /// Current overall and per-lane progress.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let lanes: Vec<LaneProgress> = self
            .lanes
            .iter()
            .map(|lane| LaneProgress {
                lane: lane.lane(),
                completed: lane.completed_count(),
                total: lane.len(),
                status: lane.status().to_owned(),
            })
            .collect();
        ProgressSnapshot {
            completed: lanes.iter().map(|lane| lane.completed).sum(),
            total: self.total_jobs,
            lanes,
        }
    }

    /// Rewrite the report file with the current elapsed time, rate and ETA.
    ///
    /// Until the first job completes the report holds nothing but the list
    /// of failed lanes, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Report` if the report cannot be persisted.
    pub fn update_report(&self) -> Result<()> {
        let input = ReportInput {
            completed: self.completed_count(),
            total: self.total_jobs,
            elapsed: self.started_at.elapsed(),
            session_start: self.session_start,
            now: Local::now(),
            failed_lanes: self.failed_lanes(),
        };
        report::write_report(&self.layout.report_path, &report::render_report(&input))
    }

    /// Run every lane to completion, permanent failure or cancellation.
    ///
    /// Lane failures never abort the session; they are reported in the
    /// returned summary and the final report. On cancellation every live
    /// worker is shut down before returning.
    ///
    /// # Errors
    ///
    /// Reserved for failures outside any single lane; lane problems are
    /// reflected in [`SessionSummary`].
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<SessionSummary> {
        let span = info_span!("session", log_dir = %self.layout.log_dir.display());
        Ok(self.run_loop(cancel).instrument(span).await)
    }

    async fn run_loop(&mut self, cancel: CancellationToken) -> SessionSummary {
        self.started_at = Instant::now();
        self.session_start = Local::now();
        info!(
            lanes = self.lanes.len(),
            jobs = self.total_jobs,
            report = %self.layout.report_path.display(),
            "session started"
        );

        for lane in &mut self.lanes {
            lane.check_in().await;
        }

        let tick = self.timing.tick();
        let report_interval = self.timing.report_interval();
        let mut last_report = Instant::now();
        let mut cancelled = false;

        while self.lanes.iter().any(|lane| !lane.is_done()) {
            tokio::select! {
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                () = tokio::time::sleep(tick) => {}
            }

            let snapshot = self.snapshot();
            self.display.update(&snapshot);

            if last_report.elapsed() >= report_interval {
                self.write_report_logged();
                last_report = Instant::now();
            }

            for lane in &mut self.lanes {
                if lane.is_done() {
                    continue;
                }
                lane.check_in().await;
                if lane.is_done() || lane.is_successful() {
                    continue;
                }
                if !lane.check_status() {
                    lane.recover(RecoveryReason::Stall).await;
                }
            }
        }

        if cancelled {
            warn!("session cancelled, stopping workers");
            let grace = self.timing.shutdown_grace();
            for lane in &mut self.lanes {
                lane.shutdown(grace).await;
            }
        }

        let snapshot = self.snapshot();
        self.display.finish(&snapshot);
        self.write_report_logged();

        let summary = SessionSummary {
            completed: snapshot.completed,
            total: self.total_jobs,
            failed_lanes: self.failed_lanes(),
            cancelled,
            report_path: self.layout.report_path.clone(),
        };

        info!(
            completed = summary.completed,
            total = summary.total,
            failed_lanes = ?summary.failed_lanes,
            cancelled,
            elapsed = %report::format_elapsed(self.started_at.elapsed()),
            "session ended"
        );

        summary
    }

    fn write_report_logged(&self) {
        if let Err(err) = self.update_report() {
            error!(%err, "failed to write session report");
        }
    }
}
