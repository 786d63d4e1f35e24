//! Session orchestration modules.
//!
//! Covers splitting jobs into lanes and batches, worker process management,
//! per-lane supervision with stall recovery, and the session poll loop.

pub mod session_coordinator;
pub mod splitter;
pub mod stall_detector;
pub mod supervisor;
pub mod worker;
