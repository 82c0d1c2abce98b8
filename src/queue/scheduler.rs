//! Dual-lane scheduler — admission routing and per-lane dispatch loops.
//!
//! Routing happens once, at enqueue time, under a scheduler-wide lock:
//! - Lightweight jobs (no known workflow) always go to the low lane.
//! - Big workflows go to the high lane or are rejected; they never fall back.
//! - Standard workflows use the high lane when the caller is eligible and it
//!   is idle, and fall back to the low lane otherwise.
//!
//! Each lane then runs its own dispatch loop: poll, take the head, run it
//! under a timeout, return to idle. The loops share nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{Job, Lane};
use super::lane::LaneQueue;
use super::status::QueueStatus;
use crate::admission::{AdmissionPolicy, WorkflowMetadataProvider};
use crate::config::QueueConfig;
use crate::error::QueueError;

/// Attached when a standard job wanted the high lane but found it busy.
pub const HIGH_LANE_BUSY_MESSAGE: &str =
    "The high-performance worker is busy, so your request was sent to the standard worker.";

/// Sent to the caller when its job outlives the lane timeout.
pub const TIMEOUT_MESSAGE: &str =
    "Sorry, your request took too long and was abandoned. Please try again.";

/// Owns both lanes and the routing policy.
pub struct LaneScheduler {
    high: Arc<LaneQueue>,
    low: Arc<LaneQueue>,
    admission: Arc<dyn AdmissionPolicy>,
    workflows: Arc<dyn WorkflowMetadataProvider>,
    poll_interval: Duration,
    job_timeout: Duration,
    /// Serializes routing decisions and whole-system snapshot/clear.
    routing: Mutex<()>,
}

impl LaneScheduler {
    pub fn new(
        config: &QueueConfig,
        admission: Arc<dyn AdmissionPolicy>,
        workflows: Arc<dyn WorkflowMetadataProvider>,
    ) -> Self {
        Self {
            high: Arc::new(LaneQueue::new(Lane::High, config.high_capacity)),
            low: Arc::new(LaneQueue::new(Lane::Low, config.low_capacity)),
            admission,
            workflows,
            poll_interval: config.poll_interval,
            job_timeout: config.job_timeout,
            routing: Mutex::new(()),
        }
    }

    pub fn lane(&self, lane: Lane) -> &Arc<LaneQueue> {
        match lane {
            Lane::High => &self.high,
            Lane::Low => &self.low,
        }
    }

    /// Route a job to a lane and queue it.
    ///
    /// Returns the advisory/position text for the caller, possibly empty.
    /// On error nothing has been queued.
    pub async fn enqueue(&self, mut job: Job) -> Result<String, QueueError> {
        let _routing = self.routing.lock().await;

        let (lane, advisory) = match self.route(&job).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    workflow = %job.workflow,
                    user = %job.caller.user_id,
                    error = %e,
                    "Job rejected"
                );
                return Err(e);
            }
        };
        job.assign_lane(lane);

        let job_id = job.id;
        let workflow = job.workflow.clone();
        let skip_queue = job.caller.skip_queue;
        let queue = self.lane(lane);
        let queued = if skip_queue {
            queue.enqueue_front(job, "").await
        } else {
            queue.enqueue(job).await
        };

        let position = match queued {
            Ok(position) => position,
            Err(e) => {
                warn!(job_id = %job_id, lane = %lane, error = %e, "Job rejected");
                return Err(e);
            }
        };

        info!(
            job_id = %job_id,
            workflow = %workflow,
            lane = %lane,
            skip_queue,
            fallback = advisory.is_some(),
            "Job admitted"
        );

        Ok(join_messages(advisory, &position))
    }

    /// Pick a lane. Never mutates a queue.
    async fn route(&self, job: &Job) -> Result<(Lane, Option<&'static str>), QueueError> {
        let Some(workflow) = self.workflows.lookup(&job.workflow) else {
            return Ok((Lane::Low, None));
        };

        if job.caller.access_level < workflow.required_access {
            return Err(QueueError::ineligible(format!(
                "{} requires {} access",
                workflow.name, workflow.required_access
            )));
        }

        let eligibility = self
            .admission
            .check_eligibility(&job.id.to_string(), &workflow, &job.caller)
            .await
            .map_err(|e| QueueError::ineligible(format!("admission check failed: {e}")))?;
        let status = eligibility.status;

        if workflow.big {
            if !status.high_reachable {
                return Err(QueueError::ineligible(format!(
                    "{} needs the high-performance worker, which is offline",
                    workflow.name
                )));
            }
            if status.foreground_active {
                return Err(QueueError::ineligible(format!(
                    "{} needs the high-performance worker, which is in use right now",
                    workflow.name
                )));
            }
            if !eligibility.entitled {
                return Err(QueueError::ineligible(format!(
                    "your access level does not allow {} on the high-performance worker",
                    workflow.name
                )));
            }
            return Ok((Lane::High, None));
        }

        let wants_high = eligibility.use_high_lane();
        if wants_high && !self.high.is_processing().await {
            return Ok((Lane::High, None));
        }

        Ok((Lane::Low, wants_high.then_some(HIGH_LANE_BUSY_MESSAGE)))
    }

    /// Start one dispatch loop per lane. Both stop when `cancel` fires.
    pub fn process_queues(&self, cancel: CancellationToken) -> Dispatchers {
        let handles = Lane::all()
            .into_iter()
            .map(|lane| {
                tokio::spawn(run_lane(
                    Arc::clone(self.lane(lane)),
                    self.poll_interval,
                    self.job_timeout,
                    cancel.clone(),
                ))
            })
            .collect();

        Dispatchers { cancel, handles }
    }

    /// Drop a lane's pending jobs. Returns how many were dropped.
    pub async fn clear_queue(&self, lane: Lane) -> usize {
        self.lane(lane).clear().await
    }

    /// Drop every pending job in both lanes.
    pub async fn clear_all_queues(&self) -> usize {
        let _routing = self.routing.lock().await;
        self.high.clear().await + self.low.clear().await
    }

    /// Forget whichever in-flight jobs are tracked. Executors keep running.
    pub async fn remove_current_item(&self) -> bool {
        let mut removed = false;
        for lane in [&self.high, &self.low] {
            if lane.is_processing().await {
                removed |= lane.remove_current().await;
            }
        }
        removed
    }

    /// Snapshot of both lanes from one consistent instant.
    pub async fn detailed_status(&self) -> QueueStatus {
        let _routing = self.routing.lock().await;
        QueueStatus {
            high: self.high.snapshot().await,
            low: self.low.snapshot().await,
            taken_at: chrono::Utc::now(),
        }
    }
}

/// Handles to the running dispatch loops.
pub struct Dispatchers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Dispatchers {
    /// Cancel both loops and wait for them to exit. In-flight jobs are not
    /// interrupted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Dispatch loop ended abnormally: {}", e);
            }
        }
    }
}

async fn run_lane(
    lane: Arc<LaneQueue>,
    poll_interval: Duration,
    job_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(lane = %lane.lane(), "Dispatch loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(job) = lane.begin_next().await else {
            continue;
        };

        info!(
            lane = %lane.lane(),
            job_id = %job.id,
            workflow = %job.workflow,
            "Dispatching job"
        );
        tokio::spawn(supervise(Arc::clone(&lane), job, job_timeout));
    }

    info!(lane = %lane.lane(), "Dispatch loop stopped");
}

/// Run one job against the timeout, then put the lane back to idle.
async fn supervise(lane: Arc<LaneQueue>, job: Arc<Job>, job_timeout: Duration) {
    let started = Instant::now();
    let executor = Arc::clone(&job.executor);
    let work = tokio::spawn({
        let job = Arc::clone(&job);
        async move { executor.execute(job).await }
    });

    let timed_out = match tokio::time::timeout(job_timeout, work).await {
        Ok(Ok(())) => {
            debug!(
                lane = %lane.lane(),
                job_id = %job.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            );
            false
        }
        Ok(Err(e)) => {
            error!(lane = %lane.lane(), job_id = %job.id, "Executor panicked: {}", e);
            false
        }
        Err(_) => {
            // Dropping the JoinHandle detaches the executor; it keeps running.
            warn!(
                lane = %lane.lane(),
                job_id = %job.id,
                timeout_secs = job_timeout.as_secs(),
                "Job timed out, lane released"
            );
            true
        }
    };

    if !lane.finish(job.id).await {
        debug!(lane = %lane.lane(), job_id = %job.id, "Job was no longer tracked");
    }

    if timed_out {
        let err = QueueError::Timeout {
            job_id: job.id,
            timeout: job_timeout,
        };
        let metadata = serde_json::json!({
            "source": "scheduler",
            "job_id": job.id.to_string(),
            "error": err.to_string(),
        });
        if let Err(e) = job.reply.send_with_metadata(TIMEOUT_MESSAGE, metadata).await {
            warn!(job_id = %job.id, "Failed to deliver timeout notice: {}", e);
        }
    }
}

fn join_messages(advisory: Option<&str>, position: &str) -> String {
    match (advisory, position.is_empty()) {
        (Some(advisory), true) => advisory.to_string(),
        (Some(advisory), false) => format!("{advisory}\n{position}"),
        (None, _) => position.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{
        HardwareStatus, LiveAdmissionPolicy, StaticStatusSource, WorkflowMetadata,
        WorkflowRegistry,
    };
    use crate::channels::ReplyHandle;
    use crate::queue::job::tests::noop_executor;
    use crate::queue::{AccessLevel, CallerCapabilities};

    fn registry() -> WorkflowRegistry {
        WorkflowRegistry::new()
            .with(WorkflowMetadata::new("sdxl", AccessLevel::Guest))
            .with(WorkflowMetadata::new("video", AccessLevel::Trusted).big())
    }

    fn scheduler(status: HardwareStatus) -> LaneScheduler {
        let config = QueueConfig {
            high_capacity: 3,
            low_capacity: 3,
            ..QueueConfig::default()
        };
        let source = Arc::new(StaticStatusSource::new(status));
        let policy = Arc::new(LiveAdmissionPolicy::from_config(source, &config));
        LaneScheduler::new(&config, policy, Arc::new(registry()))
    }

    fn job(workflow: &str, access: AccessLevel) -> Job {
        Job::new(
            workflow,
            "prompt",
            CallerCapabilities::new("bob", access),
            noop_executor(),
            ReplyHandle::detached(),
        )
    }

    #[tokio::test]
    async fn eligible_standard_job_uses_idle_high_lane() {
        let s = scheduler(HardwareStatus::available());
        let message = s.enqueue(job("sdxl", AccessLevel::Member)).await.unwrap();
        assert_eq!(message, "");
        assert_eq!(s.lane(Lane::High).len().await, 1);
        assert_eq!(
            s.lane(Lane::High).peek().await.unwrap().lane(),
            Some(Lane::High)
        );
    }

    #[tokio::test]
    async fn busy_high_lane_falls_back_with_advisory() {
        let s = scheduler(HardwareStatus::available());
        s.lane(Lane::High).set_processing(true).await;

        let message = s.enqueue(job("sdxl", AccessLevel::Member)).await.unwrap();
        assert_eq!(message, HIGH_LANE_BUSY_MESSAGE);
        assert_eq!(s.lane(Lane::Low).len().await, 1);
        assert!(s.lane(Lane::High).is_empty().await);
    }

    #[tokio::test]
    async fn ineligible_caller_falls_back_silently() {
        let s = scheduler(HardwareStatus::available());
        let message = s.enqueue(job("sdxl", AccessLevel::Guest)).await.unwrap();
        assert_eq!(message, "");
        assert_eq!(s.lane(Lane::Low).len().await, 1);
    }

    #[tokio::test]
    async fn lightweight_job_always_low() {
        let s = scheduler(HardwareStatus::available());
        s.enqueue(job("hello there", AccessLevel::Admin)).await.unwrap();
        assert_eq!(s.lane(Lane::Low).len().await, 1);
        assert!(s.lane(Lane::High).is_empty().await);
    }

    #[tokio::test]
    async fn big_job_never_falls_back() {
        let s = scheduler(HardwareStatus {
            foreground_active: true,
            ..HardwareStatus::available()
        });
        let err = s.enqueue(job("video", AccessLevel::Admin)).await.unwrap_err();
        assert!(matches!(err, QueueError::Ineligible { .. }));
        assert!(s.lane(Lane::High).is_empty().await);
        assert!(s.lane(Lane::Low).is_empty().await);

        let offline = scheduler(HardwareStatus {
            high_reachable: false,
            ..HardwareStatus::available()
        });
        assert!(offline.enqueue(job("video", AccessLevel::Admin)).await.is_err());
        assert!(offline.lane(Lane::Low).is_empty().await);
    }

    #[tokio::test]
    async fn big_job_queues_behind_busy_high_lane() {
        let s = scheduler(HardwareStatus::available());
        s.lane(Lane::High).set_processing(true).await;
        let message = s.enqueue(job("video", AccessLevel::Trusted)).await.unwrap();
        assert_eq!(message, "1 item ahead of you");
        assert_eq!(s.lane(Lane::High).len().await, 1);
    }

    #[tokio::test]
    async fn insufficient_access_rejected() {
        let s = scheduler(HardwareStatus::available());
        let err = s.enqueue(job("video", AccessLevel::Member)).await.unwrap_err();
        assert!(err.to_string().contains("requires trusted access"));
    }

    #[tokio::test]
    async fn standard_job_falls_back_even_with_low_worker_down() {
        let s = scheduler(HardwareStatus {
            low_reachable: false,
            ..HardwareStatus::available()
        });
        let message = s.enqueue(job("sdxl", AccessLevel::Guest)).await.unwrap();
        assert_eq!(message, "");
        assert_eq!(s.lane(Lane::Low).len().await, 1);

        s.lane(Lane::High).set_processing(true).await;
        let message = s.enqueue(job("sdxl", AccessLevel::Member)).await.unwrap();
        assert!(message.starts_with(HIGH_LANE_BUSY_MESSAGE));
        assert_eq!(s.lane(Lane::Low).len().await, 2);
        assert!(s.lane(Lane::High).is_empty().await);
    }

    #[tokio::test]
    async fn skip_queue_goes_to_front() {
        let s = scheduler(HardwareStatus::available());
        s.enqueue(job("chat a", AccessLevel::Guest)).await.unwrap();
        let mut vip = job("chat b", AccessLevel::Guest);
        vip.caller.skip_queue = true;
        let vip_id = vip.id;

        let message = s.enqueue(vip).await.unwrap();
        assert_eq!(message, crate::queue::lane::DEFAULT_FRONT_MESSAGE);
        assert_eq!(s.lane(Lane::Low).peek().await.unwrap().id, vip_id);
    }

    #[tokio::test]
    async fn capacity_error_propagates() {
        let s = scheduler(HardwareStatus::available());
        for _ in 0..3 {
            s.enqueue(job("chat", AccessLevel::Guest)).await.unwrap();
        }
        let err = s.enqueue(job("chat", AccessLevel::Guest)).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                lane: Lane::Low,
                ..
            }
        ));
        assert_eq!(s.lane(Lane::Low).len().await, 3);
    }

    #[tokio::test]
    async fn clear_all_and_status() {
        let s = scheduler(HardwareStatus::available());
        s.enqueue(job("sdxl", AccessLevel::Member)).await.unwrap();
        s.enqueue(job("chat", AccessLevel::Member)).await.unwrap();

        let status = s.detailed_status().await;
        assert_eq!(status.high.queued, vec!["sdxl".to_string()]);
        assert_eq!(status.low.queued, vec!["chat".to_string()]);

        assert_eq!(s.clear_all_queues().await, 2);
        assert_eq!(s.detailed_status().await.total_pending(), 0);
    }

    #[tokio::test]
    async fn remove_current_item_reports_whether_anything_was_tracked() {
        let s = scheduler(HardwareStatus::available());
        assert!(!s.remove_current_item().await);
        s.lane(Lane::Low).set_processing(true).await;
        assert!(s.remove_current_item().await);
        assert!(!s.lane(Lane::Low).is_processing().await);
    }

    #[test]
    fn messages_join() {
        assert_eq!(join_messages(None, ""), "");
        assert_eq!(join_messages(Some("a"), ""), "a");
        assert_eq!(join_messages(Some("a"), "b"), "a\nb");
    }
}
