//! Lane lifecycle states and their human-readable status lines.

use std::fmt::{Display, Formatter};

/// Why a batch had to be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    /// No progress marker appeared within the stall timeout.
    Stall,
    /// The process exited before reporting every job in its batch.
    Crash,
    /// The command could not be launched at all.
    SpawnFailure,
}

impl Display for RecoveryReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stall => f.write_str("stall"),
            Self::Crash => f.write_str("crash"),
            Self::SpawnFailure => f.write_str("spawn failure"),
        }
    }
}

/// Lifecycle state of one lane.
///
/// `NotStarted → Running(batch) → … → Finished`, with `Failed` reachable
/// from `Running` once the restart cap is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// No batch launched yet.
    NotStarted,
    /// A worker is executing `batch`; `restarts` counts prior attempts.
    Running {
        /// Zero-based batch index.
        batch: usize,
        /// Restarts already spent on this batch.
        restarts: u32,
        /// Cause of the most recent restart, if any.
        last_recovery: Option<RecoveryReason>,
    },
    /// Every batch completed successfully.
    Finished,
    /// The lane gave up on `batch` after exhausting its restarts.
    Failed {
        /// Zero-based batch index that could not be completed.
        batch: usize,
        /// Cause of the final failure.
        reason: RecoveryReason,
    },
}

impl LaneState {
    /// Whether the lane no longer needs polling.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed { .. })
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::NotStarted, Self::Running { batch: 0, .. } | Self::Finished) => true,
            (Self::Running { batch, .. }, Self::Running { batch: next_batch, .. }) => {
                next_batch == *batch || next_batch == batch + 1
            }
            (Self::Running { .. }, Self::Finished | Self::Failed { .. }) => true,
            _ => false,
        }
    }

    /// Status line shown in the progress display and the logs.
    #[must_use]
    pub fn describe(&self, lane: usize, batch_count: usize, max_restarts: u32) -> String {
        match *self {
            Self::NotStarted => format!("LANE {lane} WAITING"),
            Self::Running {
                batch,
                restarts: 0,
                ..
            } => format!("LANE {lane} RUNNING BATCH {}/{batch_count}...", batch + 1),
            Self::Running {
                batch,
                restarts,
                last_recovery,
            } => {
                let cause = last_recovery.map_or_else(String::new, |r| format!(" AFTER {r}"));
                format!(
                    "LANE {lane} RUNNING BATCH {}/{batch_count} (RESTART {restarts}/{max_restarts}{})...",
                    batch + 1,
                    cause.to_uppercase()
                )
            }
            Self::Finished => format!("✓ LANE {lane} COMPLETED."),
            Self::Failed { batch, reason } => format!(
                "✗ LANE {lane} FAILED ON BATCH {}/{batch_count} ({reason}, restart limit reached).",
                batch + 1
            ),
        }
    }
}
