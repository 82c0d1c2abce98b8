//! Single-lane queue — bounded FIFO with privileged front insertion.
//!
//! The pending sequence and the processing state live behind separate locks,
//! so a routing decision that only asks "is this lane busy" never waits on an
//! enqueue or dequeue. When both are needed the pending lock is taken first.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::job::{Job, Lane};
use super::status::LaneStatus;
use crate::error::QueueError;

/// Advisory text for a front insertion when the caller gave none.
pub const DEFAULT_FRONT_MESSAGE: &str = "Your request was moved to the front of the queue.";

/// A queued job and whether it was inserted through the privileged path.
struct Entry {
    job: Job,
    privileged: bool,
}

#[derive(Default)]
struct Processing {
    active: bool,
    current: Option<Arc<Job>>,
}

/// One lane's pending jobs plus its single-flight processing state.
pub struct LaneQueue {
    lane: Lane,
    capacity: usize,
    pending: RwLock<VecDeque<Entry>>,
    processing: Mutex<Processing>,
}

impl LaneQueue {
    pub fn new(lane: Lane, capacity: usize) -> Self {
        Self {
            lane,
            capacity,
            pending: RwLock::new(VecDeque::with_capacity(capacity)),
            processing: Mutex::new(Processing::default()),
        }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Append a job. Returns a position message, empty when the job runs next.
    pub async fn enqueue(&self, mut job: Job) -> Result<String, QueueError> {
        let mut pending = self.pending.write().await;
        if pending.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded {
                lane: self.lane,
                capacity: self.capacity,
            });
        }
        job.assign_lane(self.lane);

        let processing = self.processing.lock().await.active;
        let ahead = pending.len() + usize::from(processing);

        debug!(lane = %self.lane, job_id = %job.id, ahead, "Job appended");
        pending.push_back(Entry {
            job,
            privileged: false,
        });

        Ok(position_message(ahead))
    }

    /// Insert a privileged job ahead of every ordinary job, behind earlier
    /// privileged ones. Returns `override_message` (or the default notice)
    /// only if the lane was busy at insertion time.
    pub async fn enqueue_front(
        &self,
        mut job: Job,
        override_message: &str,
    ) -> Result<String, QueueError> {
        let mut pending = self.pending.write().await;
        if pending.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded {
                lane: self.lane,
                capacity: self.capacity,
            });
        }
        job.assign_lane(self.lane);

        let processing = self.processing.lock().await.active;
        let busy = processing || !pending.is_empty();
        let index = pending.iter().take_while(|e| e.privileged).count();

        debug!(lane = %self.lane, job_id = %job.id, index, busy, "Job inserted at front");
        pending.insert(
            index,
            Entry {
                job,
                privileged: true,
            },
        );

        if !busy {
            return Ok(String::new());
        }
        if override_message.is_empty() {
            Ok(DEFAULT_FRONT_MESSAGE.to_string())
        } else {
            Ok(override_message.to_string())
        }
    }

    /// Remove and return the head of the lane.
    pub async fn dequeue(&self) -> Option<Job> {
        self.pending.write().await.pop_front().map(|e| e.job)
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Clone of the head job, if any.
    pub async fn peek(&self) -> Option<Job> {
        self.pending.read().await.front().map(|e| e.job.clone())
    }

    pub async fn set_processing(&self, active: bool) {
        let mut state = self.processing.lock().await;
        state.active = active;
        if !active {
            state.current = None;
        }
    }

    pub async fn is_processing(&self) -> bool {
        self.processing.lock().await.active
    }

    /// The job currently handed to the executor, if tracked.
    pub async fn current(&self) -> Option<Arc<Job>> {
        self.processing.lock().await.current.clone()
    }

    /// Drop every pending job. An in-flight job is untouched.
    pub async fn clear(&self) -> usize {
        let mut pending = self.pending.write().await;
        let dropped = pending.len();
        pending.clear();
        info!(lane = %self.lane, dropped, "Lane cleared");
        dropped
    }

    /// Stop tracking the in-flight job. The executor is not cancelled.
    pub async fn remove_current(&self) -> bool {
        let mut state = self.processing.lock().await;
        if !state.active {
            return false;
        }
        let forgotten = state.current.take().map(|job| job.id);
        state.active = false;
        info!(lane = %self.lane, job_id = ?forgotten, "Forgot in-flight job");
        true
    }

    /// Dequeue the head for execution and mark the lane processing in one step.
    /// Returns `None` if the lane is already busy or has nothing pending.
    pub(crate) async fn begin_next(&self) -> Option<Arc<Job>> {
        let mut pending = self.pending.write().await;
        let mut state = self.processing.lock().await;
        if state.active {
            return None;
        }
        let job = Arc::new(pending.pop_front()?.job);
        state.active = true;
        state.current = Some(Arc::clone(&job));
        Some(job)
    }

    /// Return to idle, but only if `job_id` is still the tracked job.
    pub(crate) async fn finish(&self, job_id: Uuid) -> bool {
        let mut state = self.processing.lock().await;
        match &state.current {
            Some(current) if current.id == job_id => {
                state.active = false;
                state.current = None;
                true
            }
            _ => false,
        }
    }

    /// Consistent view of this lane.
    pub async fn snapshot(&self) -> LaneStatus {
        let pending = self.pending.read().await;
        let state = self.processing.lock().await;
        LaneStatus {
            lane: self.lane,
            capacity: self.capacity,
            length: pending.len(),
            processing: state.active,
            current: state.current.as_ref().map(|job| job.workflow.clone()),
            queued: pending.iter().map(|e| e.job.workflow.clone()).collect(),
        }
    }
}

fn position_message(ahead: usize) -> String {
    match ahead {
        0 => String::new(),
        1 => "1 item ahead of you".to_string(),
        n => format!("{n} items ahead of you"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::job::tests::make_job;

    #[tokio::test]
    async fn fifo_order_and_len() {
        let lane = LaneQueue::new(Lane::Low, 5);
        let mut ids = Vec::new();
        for i in 0..4 {
            let job = make_job(&format!("wf-{i}"));
            ids.push(job.id);
            lane.enqueue(job).await.unwrap();
        }
        assert_eq!(lane.len().await, 4);

        for id in ids {
            assert_eq!(lane.dequeue().await.unwrap().id, id);
        }
        assert!(lane.is_empty().await);
        assert!(lane.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_sets_lane() {
        let lane = LaneQueue::new(Lane::High, 2);
        lane.enqueue(make_job("sdxl")).await.unwrap();
        assert_eq!(lane.peek().await.unwrap().lane(), Some(Lane::High));
    }

    #[tokio::test]
    async fn capacity_exceeded_leaves_len_unchanged() {
        let lane = LaneQueue::new(Lane::High, 2);
        lane.enqueue(make_job("a")).await.unwrap();
        lane.enqueue(make_job("b")).await.unwrap();

        let err = lane.enqueue(make_job("c")).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                lane: Lane::High,
                capacity: 2
            }
        ));
        assert_eq!(lane.len().await, 2);

        let err = lane.enqueue_front(make_job("d"), "").await.unwrap_err();
        assert!(matches!(err, QueueError::CapacityExceeded { .. }));
        assert_eq!(lane.len().await, 2);
    }

    #[tokio::test]
    async fn position_messages() {
        let lane = LaneQueue::new(Lane::Low, 10);
        assert_eq!(lane.enqueue(make_job("a")).await.unwrap(), "");
        assert_eq!(
            lane.enqueue(make_job("b")).await.unwrap(),
            "1 item ahead of you"
        );

        lane.set_processing(true).await;
        assert_eq!(
            lane.enqueue(make_job("c")).await.unwrap(),
            "3 items ahead of you"
        );
    }

    #[tokio::test]
    async fn front_insertion_order() {
        let lane = LaneQueue::new(Lane::Low, 10);
        let normal_a = make_job("normal-a");
        let normal_b = make_job("normal-b");
        let front_1 = make_job("front-1");
        let front_2 = make_job("front-2");
        let expected = [front_1.id, front_2.id, normal_a.id, normal_b.id];

        lane.enqueue(normal_a).await.unwrap();
        lane.enqueue(normal_b).await.unwrap();
        lane.enqueue_front(front_1, "").await.unwrap();
        lane.enqueue_front(front_2, "").await.unwrap();

        for id in expected {
            assert_eq!(lane.dequeue().await.unwrap().id, id);
        }
    }

    #[tokio::test]
    async fn front_message_only_when_busy() {
        let lane = LaneQueue::new(Lane::Low, 10);
        assert_eq!(lane.enqueue_front(make_job("a"), "").await.unwrap(), "");

        assert_eq!(
            lane.enqueue_front(make_job("b"), "").await.unwrap(),
            DEFAULT_FRONT_MESSAGE
        );
        assert_eq!(
            lane.enqueue_front(make_job("c"), "VIP lane").await.unwrap(),
            "VIP lane"
        );

        let idle_but_processing = LaneQueue::new(Lane::High, 10);
        idle_but_processing.set_processing(true).await;
        assert_eq!(
            idle_but_processing
                .enqueue_front(make_job("d"), "")
                .await
                .unwrap(),
            DEFAULT_FRONT_MESSAGE
        );
    }

    #[tokio::test]
    async fn clear_keeps_in_flight() {
        let lane = LaneQueue::new(Lane::High, 10);
        lane.enqueue(make_job("a")).await.unwrap();
        lane.enqueue(make_job("b")).await.unwrap();
        let running = lane.begin_next().await.unwrap();

        assert_eq!(lane.clear().await, 1);
        assert!(lane.is_empty().await);
        assert!(lane.is_processing().await);
        assert_eq!(lane.current().await.unwrap().id, running.id);
    }

    #[tokio::test]
    async fn begin_next_is_single_flight() {
        let lane = LaneQueue::new(Lane::High, 10);
        lane.enqueue(make_job("a")).await.unwrap();
        lane.enqueue(make_job("b")).await.unwrap();

        let first = lane.begin_next().await.unwrap();
        assert!(lane.begin_next().await.is_none());
        assert_eq!(lane.len().await, 1);

        assert!(lane.finish(first.id).await);
        assert!(!lane.is_processing().await);
        assert!(lane.begin_next().await.is_some());
    }

    #[tokio::test]
    async fn begin_next_on_empty_stays_idle() {
        let lane = LaneQueue::new(Lane::Low, 1);
        assert!(lane.begin_next().await.is_none());
        assert!(!lane.is_processing().await);
    }

    #[tokio::test]
    async fn stale_finish_does_not_clobber() {
        let lane = LaneQueue::new(Lane::High, 10);
        lane.enqueue(make_job("a")).await.unwrap();
        lane.enqueue(make_job("b")).await.unwrap();

        let first = lane.begin_next().await.unwrap();
        assert!(lane.remove_current().await);
        let second = lane.begin_next().await.unwrap();

        assert!(!lane.finish(first.id).await);
        assert!(lane.is_processing().await);
        assert!(lane.finish(second.id).await);
    }

    #[tokio::test]
    async fn remove_current_when_idle() {
        let lane = LaneQueue::new(Lane::Low, 1);
        assert!(!lane.remove_current().await);
    }

    #[tokio::test]
    async fn snapshot_lists_workflows() {
        let lane = LaneQueue::new(Lane::Low, 4);
        lane.enqueue(make_job("sdxl")).await.unwrap();
        lane.enqueue(make_job("chat")).await.unwrap();
        lane.begin_next().await.unwrap();

        let status = lane.snapshot().await;
        assert_eq!(status.length, 1);
        assert!(status.processing);
        assert_eq!(status.current.as_deref(), Some("sdxl"));
        assert_eq!(status.queued, vec!["chat".to_string()]);
    }
}
