//! Lane supervisor: runs one lane's batches strictly in sequence.
//!
//! The supervisor is polled by the coordinator. [`check_in`](LaneSupervisor::check_in)
//! advances to the next batch when the current process exits,
//! [`check_status`](LaneSupervisor::check_status) applies the stall heuristic,
//! and [`recover`](LaneSupervisor::recover) replaces a stuck or crashed
//! process with a fresh one on the same batch until the restart budget runs
//! out.
//!
//! All batches of a lane share one log file, so progress is cumulative per
//! lane: jobs of finished batches plus the best count any attempt of the
//! current batch has reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::command::CommandBuilder;
use crate::models::job::Batch;
use crate::models::lane::{LaneState, RecoveryReason};
use crate::orchestrator::stall_detector::StallDetector;
use crate::orchestrator::worker::{WorkerOutput, WorkerProcess};
use crate::Result;

/// Per-lane knobs shared by every supervisor of a session.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Prefix of a job-completed line in worker output.
    pub progress_marker: String,
    /// Longest gap between progress markers before a restart.
    pub stall_timeout: Duration,
    /// Restarts allowed per batch before the lane fails.
    pub max_restarts: u32,
}

/// Owns one lane's batch queue and its single live worker process.
pub struct LaneSupervisor {
    lane: usize,
    batches: Vec<Batch>,
    total_jobs: usize,
    command: Arc<dyn CommandBuilder>,
    scratch_dir: PathBuf,
    output: WorkerOutput,
    settings: SupervisorSettings,
    state: LaneState,
    worker: Option<WorkerProcess>,
    /// Jobs in batches that have already succeeded.
    completed_before: usize,
    /// Highest count reached by an abandoned attempt of the current batch.
    best_attempt: usize,
    stall: StallDetector,
    status: String,
}

impl LaneSupervisor {
    /// Build a supervisor for `lane`. Nothing runs until the first
    /// [`check_in`](Self::check_in).
    #[must_use]
    pub fn new(
        lane: usize,
        batches: Vec<Batch>,
        command: Arc<dyn CommandBuilder>,
        scratch_dir: PathBuf,
        output: WorkerOutput,
        settings: SupervisorSettings,
    ) -> Self {
        let total_jobs = batches.iter().map(Batch::len).sum();
        let stall = StallDetector::new(settings.stall_timeout, Instant::now());
        let state = LaneState::NotStarted;
        let status = state.describe(lane, batches.len(), settings.max_restarts);
        Self {
            lane,
            batches,
            total_jobs,
            command,
            scratch_dir,
            output,
            settings,
            state,
            worker: None,
            completed_before: 0,
            best_attempt: 0,
            stall,
            status,
        }
    }

    /// Lane index.
    #[must_use]
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Total jobs assigned to this lane.
    #[must_use]
    pub fn len(&self) -> usize {
        self.total_jobs
    }

    /// Whether the lane was assigned no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_jobs == 0
    }

    /// Number of batches in the lane.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LaneState {
        self.state
    }

    /// Human-readable status line.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Whether the lane has finished or permanently failed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Whether the lane exhausted its restart budget.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        matches!(self.state, LaneState::Failed { .. })
    }

    /// Whether the current worker process is alive.
    pub fn is_running(&mut self) -> bool {
        self.worker.as_mut().is_some_and(WorkerProcess::is_running)
    }

    /// Cumulative jobs completed by this lane across all its batches.
    ///
    /// Never decreases: a restarted batch contributes the best count any of
    /// its attempts has reached, capped at the batch size.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        let current = self.worker.as_ref().map_or(0, WorkerProcess::completed_count);
        let in_batch = current.max(self.best_attempt).min(self.current_batch_len());
        self.completed_before + in_batch
    }

    /// Whether every job of the lane has been reported complete.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.completed_count() >= self.total_jobs
    }

    /// Advance the lane if its current process has exited.
    ///
    /// A process that exited after reporting its whole batch moves the lane
    /// to the next batch (or to `Finished`). One that exited short is a
    /// crash and goes through [`recover`](Self::recover).
    pub async fn check_in(&mut self) {
        if self.state.is_done() {
            return;
        }

        if let Some(worker) = self.worker.as_mut() {
            if worker.is_running() {
                return;
            }
            worker.drain_output().await;
        }

        match self.state {
            LaneState::NotStarted => self.advance_to(0),
            LaneState::Running { batch, .. } => {
                let Some(worker) = self.worker.as_ref() else {
                    self.advance_to(batch);
                    return;
                };

                if worker.is_successful() {
                    info!(
                        lane = self.lane,
                        batch,
                        jobs = worker.batch().len(),
                        "batch completed"
                    );
                    self.completed_before += self.current_batch_len();
                    self.best_attempt = 0;
                    self.advance_to(batch + 1);
                } else {
                    warn!(
                        lane = self.lane,
                        batch,
                        completed = worker.completed_count(),
                        expected = worker.batch().len(),
                        exit = ?worker.exit_status(),
                        "worker exited before finishing its batch"
                    );
                    self.recover(RecoveryReason::Crash).await;
                }
            }
            LaneState::Finished | LaneState::Failed { .. } => {}
        }
    }

    /// Stall check: `false` once the current process has gone a full
    /// timeout without emitting a new progress marker.
    ///
    /// Liveness follows the live attempt's own marker count, not the lane's
    /// capped total, so a restarted process is alive as soon as it reports
    /// anything, even while it is still below an earlier attempt's best.
    pub fn check_status(&mut self) -> bool {
        if !matches!(self.state, LaneState::Running { .. }) {
            return true;
        }
        let attempt_count = self.worker.as_ref().map_or(0, WorkerProcess::completed_count);
        let alive = self.stall.observe(attempt_count, Instant::now());
        if !alive {
            warn!(
                lane = self.lane,
                idle_secs = self.stall.idle_for(Instant::now()).as_secs(),
                timeout_secs = self.stall.inactivity_threshold().as_secs(),
                "lane stalled"
            );
        }
        alive
    }

    /// Kill the current process and restart its batch, or mark the lane
    /// failed when the batch has used up its restarts.
    pub async fn recover(&mut self, reason: RecoveryReason) {
        let LaneState::Running { batch, restarts, .. } = self.state else {
            return;
        };

        if let Some(worker) = self.worker.as_mut() {
            worker.terminate().await;
            self.best_attempt = self.best_attempt.max(worker.completed_count());
        }

        if restarts >= self.settings.max_restarts {
            self.fail(batch, reason);
            return;
        }

        warn!(
            lane = self.lane,
            batch,
            attempt = restarts + 1,
            max_restarts = self.settings.max_restarts,
            %reason,
            "restarting batch"
        );
        self.start_batch(batch, restarts + 1, Some(reason));
    }

    /// Stop the live process, politely first.
    pub async fn shutdown(&mut self, grace: Duration) {
        if let Some(worker) = self.worker.as_mut() {
            worker.shutdown(grace).await;
        }
    }

    fn current_batch_len(&self) -> usize {
        match self.state {
            LaneState::Running { batch, .. } | LaneState::Failed { batch, .. } => {
                self.batches.get(batch).map_or(0, Batch::len)
            }
            LaneState::NotStarted | LaneState::Finished => 0,
        }
    }

    fn advance_to(&mut self, batch: usize) {
        if batch >= self.batches.len() {
            self.worker = None;
            self.set_state(LaneState::Finished);
            info!(lane = self.lane, jobs = self.total_jobs, "lane completed");
            return;
        }
        self.start_batch(batch, 0, None);
    }

    /// Launch `batch`, spending restarts on spawn failures.
    fn start_batch(&mut self, batch: usize, mut restarts: u32, mut reason: Option<RecoveryReason>) {
        loop {
            match self.launch(batch, restarts, reason) {
                Ok(()) => return,
                Err(err) => {
                    error!(lane = self.lane, batch, %err, "failed to start worker");
                    if restarts >= self.settings.max_restarts {
                        self.fail(batch, RecoveryReason::SpawnFailure);
                        return;
                    }
                    restarts += 1;
                    reason = Some(RecoveryReason::SpawnFailure);
                }
            }
        }
    }

    fn launch(
        &mut self,
        batch: usize,
        restarts: u32,
        reason: Option<RecoveryReason>,
    ) -> Result<()> {
        self.set_state(LaneState::Running {
            batch,
            restarts,
            last_recovery: reason,
        });
        self.worker = None;

        let mut worker = WorkerProcess::new(
            self.batches[batch].clone(),
            self.settings.progress_marker.clone(),
            self.output.try_clone()?,
        );
        worker.start(self.command.as_ref(), &self.scratch_dir)?;
        self.worker = Some(worker);
        self.stall.restart(Instant::now());
        Ok(())
    }

    fn fail(&mut self, batch: usize, reason: RecoveryReason) {
        self.worker = None;
        self.set_state(LaneState::Failed { batch, reason });
        error!(
            lane = self.lane,
            batch,
            %reason,
            max_restarts = self.settings.max_restarts,
            "lane failed, restart limit reached"
        );
    }

    fn set_state(&mut self, next: LaneState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid lane transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
        self.status = next.describe(self.lane, self.batches.len(), self.settings.max_restarts);
    }
}
