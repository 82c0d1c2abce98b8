//! Dual-lane generation queue.
//!
//! Core components:
//! - `job` — Job descriptor, lane and caller capability types
//! - `lane` — Single-lane bounded FIFO with privileged front insertion
//! - `scheduler` — Admission routing and one dispatch loop per lane
//! - `status` — Point-in-time snapshot of both lanes

pub mod job;
pub mod lane;
pub mod scheduler;
pub mod status;

pub use job::{AccessLevel, CallerCapabilities, Job, Lane, WorkExecutor};
pub use lane::LaneQueue;
pub use scheduler::{Dispatchers, LaneScheduler};
pub use status::{LaneStatus, QueueStatus};
