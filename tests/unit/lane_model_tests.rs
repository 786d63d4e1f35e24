//! Lane state transitions and status lines.

use lanefarm::models::lane::{LaneState, RecoveryReason};

fn running(batch: usize, restarts: u32) -> LaneState {
    LaneState::Running {
        batch,
        restarts,
        last_recovery: (restarts > 0).then_some(RecoveryReason::Stall),
    }
}

#[test]
fn allowed_transitions() {
    assert!(LaneState::NotStarted.can_transition_to(running(0, 0)));
    assert!(LaneState::NotStarted.can_transition_to(LaneState::Finished));
    assert!(running(0, 0).can_transition_to(running(1, 0)));
    assert!(running(1, 0).can_transition_to(running(1, 1)));
    assert!(running(1, 2).can_transition_to(LaneState::Finished));
    assert!(running(1, 3).can_transition_to(LaneState::Failed {
        batch: 1,
        reason: RecoveryReason::Crash
    }));
}

#[test]
fn rejected_transitions() {
    assert!(!LaneState::NotStarted.can_transition_to(running(1, 0)));
    assert!(!running(0, 0).can_transition_to(running(2, 0)));
    assert!(!LaneState::Finished.can_transition_to(running(0, 0)));
    assert!(!LaneState::Failed {
        batch: 0,
        reason: RecoveryReason::Stall
    }
    .can_transition_to(running(0, 0)));
}

#[test]
fn done_states() {
    assert!(!LaneState::NotStarted.is_done());
    assert!(!running(0, 0).is_done());
    assert!(LaneState::Finished.is_done());
    assert!(LaneState::Failed {
        batch: 0,
        reason: RecoveryReason::SpawnFailure
    }
    .is_done());
}

#[test]
fn status_lines() {
    assert_eq!(running(0, 0).describe(2, 3, 3), "LANE 2 RUNNING BATCH 1/3...");
    assert_eq!(
        running(1, 2).describe(0, 2, 3),
        "LANE 0 RUNNING BATCH 2/2 (RESTART 2/3 AFTER STALL)..."
    );
    assert_eq!(LaneState::Finished.describe(4, 1, 3), "✓ LANE 4 COMPLETED.");
    assert_eq!(
        LaneState::Failed {
            batch: 0,
            reason: RecoveryReason::Crash
        }
        .describe(1, 2, 3),
        "✗ LANE 1 FAILED ON BATCH 1/2 (crash, restart limit reached)."
    );
}
