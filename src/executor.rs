//! Stand-in work executor for local runs.
//!
//! Real generation backends live outside this crate. The simulated executor
//! holds the lane for a fixed time and then reports back to the caller, which
//! is enough to exercise queueing, fallback and timeouts end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::queue::{Job, WorkExecutor};

pub struct SimulatedExecutor {
    duration: Duration,
}

impl SimulatedExecutor {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl WorkExecutor for SimulatedExecutor {
    async fn execute(&self, job: Arc<Job>) {
        tracing::debug!(job_id = %job.id, workflow = %job.workflow, "Simulating work");
        tokio::time::sleep(self.duration).await;

        let lane = job
            .lane()
            .map(|lane| lane.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let message = if job.prompt.is_empty() {
            format!("✅ {} finished on the {lane} worker", job.workflow)
        } else {
            format!(
                "✅ {} finished on the {lane} worker: \"{}\"",
                job.workflow, job.prompt
            )
        };

        if let Err(e) = job.reply.send(message).await {
            tracing::warn!(job_id = %job.id, "Failed to deliver result: {}", e);
        }
    }
}
