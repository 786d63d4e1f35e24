//! One external worker process executing one batch.
//!
//! Output is either appended to the lane's log file or, in console mode,
//! tailed line by line and echoed to our stdout. Progress is the number of
//! lines starting with the progress marker that this process produced.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::CommandBuilder;
use crate::models::job::Batch;
use crate::{AppError, Result};

/// Where a worker's standard output and error go.
#[derive(Debug)]
pub enum WorkerOutput {
    /// Append both streams to a log file.
    Log {
        /// Log file path, re-read to count progress markers.
        path: PathBuf,
        /// Append-mode handle shared with every process of the lane.
        file: File,
    },
    /// Echo stdout to the console; stderr is inherited.
    Console,
}

impl WorkerOutput {
    /// Open (or create) `path` in append mode.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened.
    pub fn open_log(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| {
                AppError::Io(format!("failed to open log {}: {err}", path.display()))
            })?;
        Ok(Self::Log {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Duplicate the sink so a new process can write to the same place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file handle cannot be duplicated.
    pub fn try_clone(&self) -> Result<Self> {
        match self {
            Self::Log { path, file } => Ok(Self::Log {
                path: path.clone(),
                file: file.try_clone().map_err(|err| {
                    AppError::Io(format!("failed to duplicate log handle: {err}"))
                })?,
            }),
            Self::Console => Ok(Self::Console),
        }
    }

    /// Log file path, if output is captured to a file.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::Log { path, .. } => Some(path),
            Self::Console => None,
        }
    }
}

/// Handle to the external process running one [`Batch`].
#[derive(Debug)]
pub struct WorkerProcess {
    batch: Batch,
    marker: String,
    output: WorkerOutput,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    /// Log length when this process started; markers before it belong to
    /// earlier processes of the lane.
    log_offset: u64,
    console_count: Arc<AtomicUsize>,
    tail_task: Option<JoinHandle<()>>,
}

impl WorkerProcess {
    /// Prepare a worker for `batch`; nothing is spawned until [`start`](Self::start).
    #[must_use]
    pub fn new(batch: Batch, marker: impl Into<String>, output: WorkerOutput) -> Self {
        Self {
            batch,
            marker: marker.into(),
            output,
            child: None,
            exit_status: None,
            log_offset: 0,
            console_count: Arc::new(AtomicUsize::new(0)),
            tail_task: None,
        }
    }

    /// Batch this worker executes.
    #[must_use]
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// OS process id while the process is alive.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Exit status once the process has been reaped.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Whether [`start`](Self::start) has spawned a process.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.child.is_some()
    }

    /// Bind the batch through `command` and spawn the process without
    /// waiting for it. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the command cannot be built or launched,
    /// or `AppError::Io` if the output sink cannot be attached.
    pub fn start(&mut self, command: &dyn CommandBuilder, scratch_dir: &Path) -> Result<()> {
        let invocation = command.set_job(&self.batch, scratch_dir)?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so helpers forked by a wrapper script die with it.
        #[cfg(unix)]
        cmd.process_group(0);

        match &self.output {
            WorkerOutput::Log { path, file } => {
                self.log_offset = file
                    .metadata()
                    .map_err(|err| {
                        AppError::Io(format!("failed to stat log {}: {err}", path.display()))
                    })?
                    .len();
                let stdout = file.try_clone().map_err(|err| {
                    AppError::Io(format!("failed to duplicate log handle: {err}"))
                })?;
                let stderr = file.try_clone().map_err(|err| {
                    AppError::Io(format!("failed to duplicate log handle: {err}"))
                })?;
                cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
            }
            WorkerOutput::Console => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn {} for lane {} batch {}: {err}",
                invocation.program, self.batch.lane, self.batch.index
            ))
        })?;

        if let Some(stdout) = child.stdout.take() {
            let counter = Arc::new(AtomicUsize::new(0));
            self.console_count = Arc::clone(&counter);
            self.tail_task = Some(spawn_console_tail(stdout, self.marker.clone(), counter));
        }

        info!(
            lane = self.batch.lane,
            batch = self.batch.index,
            jobs = self.batch.len(),
            pid = child.id().unwrap_or(0),
            program = invocation.program,
            "worker process spawned"
        );

        self.exit_status = None;
        self.child = Some(child);
        Ok(())
    }

    /// `true` until the process exits. Never blocks.
    pub fn is_running(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    lane = self.batch.lane,
                    batch = self.batch.index,
                    %status,
                    "worker process exited"
                );
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(err) => {
                warn!(
                    lane = self.batch.lane,
                    batch = self.batch.index,
                    %err,
                    "failed to poll worker process status"
                );
                false
            }
        }
    }

    /// Kill the process and everything in its process group, then reap it.
    /// No-op once exited.
    pub async fn terminate(&mut self) {
        if !self.is_running() {
            return;
        }

        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);

        let Some(child) = self.child.as_mut() else {
            return;
        };

        if let Err(err) = child.kill().await {
            warn!(lane = self.batch.lane, %err, "failed to kill worker process");
        }
        self.exit_status = child.try_wait().ok().flatten();
        self.drain_output().await;
        info!(
            lane = self.batch.lane,
            batch = self.batch.index,
            "worker process terminated"
        );
    }

    /// Ask the process group to stop with `SIGTERM`, then kill it if the
    /// process is still alive after `grace`.
    pub async fn shutdown(&mut self, grace: Duration) {
        if !self.is_running() {
            return;
        }

        #[cfg(unix)]
        if self.signal_group(nix::sys::signal::Signal::SIGTERM) {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
                    self.exit_status = Some(status);
                    self.drain_output().await;
                    return;
                }
            }
        }

        #[cfg(not(unix))]
        let _ = grace;

        self.terminate().await;
    }

    /// Send `signal` to the worker's process group. Returns whether it was
    /// delivered.
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pgid) = self.pid().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => true,
            Err(err) => {
                warn!(lane = self.batch.lane, %err, ?signal, "failed to signal worker process group");
                false
            }
        }
    }

    /// Progress markers emitted by this process so far; 0 before start.
    ///
    /// In log mode this re-reads the log from the offset recorded at start,
    /// so the cost grows with the batch's output.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        if self.child.is_none() {
            return 0;
        }

        match &self.output {
            WorkerOutput::Log { path, .. } => {
                count_markers_from(path, self.log_offset, &self.marker).unwrap_or_else(|err| {
                    warn!(lane = self.batch.lane, %err, "failed to read worker log");
                    0
                })
            }
            WorkerOutput::Console => self.console_count.load(Ordering::SeqCst),
        }
    }

    /// `true` once every job in the batch has been reported complete.
    ///
    /// A process that exits early is not successful even with a zero exit
    /// code.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.completed_count() >= self.batch.len()
    }

    /// Wait until console output has been fully consumed.
    ///
    /// Call after the process exits so that markers still buffered in the
    /// pipe are counted. Returns immediately in log mode.
    pub async fn drain_output(&mut self) {
        if let Some(task) = self.tail_task.take() {
            if let Err(err) = task.await {
                warn!(lane = self.batch.lane, %err, "console tail task failed");
            }
        }
    }
}

/// Count lines starting with `marker` in `path` after byte `offset`.
///
/// # Errors
///
/// Returns `AppError::Io` if the log cannot be opened or read.
pub fn count_markers_from(path: &Path, offset: u64, marker: &str) -> Result<usize> {
    let mut file = File::open(path)
        .map_err(|err| AppError::Io(format!("failed to open log {}: {err}", path.display())))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|err| AppError::Io(format!("failed to seek log {}: {err}", path.display())))?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|err| AppError::Io(format!("failed to read log {}: {err}", path.display())))?;

    Ok(count_markers(&String::from_utf8_lossy(&raw), marker))
}

/// Count lines of `text` that start with `marker`.
#[must_use]
pub fn count_markers(text: &str, marker: &str) -> usize {
    text.lines().filter(|line| line.starts_with(marker)).count()
}

fn spawn_console_tail(
    stdout: tokio::process::ChildStdout,
    marker: String,
    counter: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.starts_with(&marker) {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    println!("{line}");
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "failed to read worker stdout");
                    break;
                }
            }
        }
    })
}
