//! Status snapshots for administrative commands.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::job::Lane;

/// State of one lane at a single instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneStatus {
    pub lane: Lane,
    pub capacity: usize,
    pub length: usize,
    pub processing: bool,
    /// Workflow of the in-flight job, if one is tracked.
    pub current: Option<String>,
    /// Workflows of the pending jobs, head first.
    pub queued: Vec<String>,
}

/// Both lanes, taken under the scheduler lock.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub high: LaneStatus,
    pub low: LaneStatus,
    pub taken_at: DateTime<Utc>,
}

impl QueueStatus {
    pub fn total_pending(&self) -> usize {
        self.high.length + self.low.length
    }
}

impl fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (&self.current, self.processing) {
            (Some(workflow), true) => format!("processing {workflow}"),
            (None, true) => "processing".to_string(),
            _ => "idle".to_string(),
        };
        write!(
            f,
            "{} lane: {state}, {}/{} queued",
            self.lane, self.length, self.capacity
        )?;
        if !self.queued.is_empty() {
            write!(f, " [{}]", self.queued.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.high)?;
        write!(f, "{}", self.low)
    }
}
