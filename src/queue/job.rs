//! Job descriptor and the types routing decisions are made from.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::ReplyHandle;

/// One of the two hardware-backed worker lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Lane A, backed by the high-performance GPU.
    High,
    /// Lane B, backed by the low-performance GPU.
    Low,
}

impl Lane {
    pub fn all() -> [Lane; 2] {
        [Lane::High, Lane::Low]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high-performance",
            Self::Low => "low-performance",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Lane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "a" | "fast" => Ok(Self::High),
            "low" | "b" | "slow" => Ok(Self::Low),
            other => Err(format!("unknown lane '{other}' (expected high or low)")),
        }
    }
}

/// Caller access level. Ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Guest,
    Member,
    Trusted,
    Admin,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Trusted => "trusted",
            Self::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "member" => Ok(Self::Member),
            "trusted" => Ok(Self::Trusted),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown access level '{other}'")),
        }
    }
}

/// Snapshot of what the caller is allowed to do, taken at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerCapabilities {
    pub user_id: String,
    pub access_level: AccessLevel,
    /// Privileged callers are inserted ahead of ordinary queued jobs.
    pub skip_queue: bool,
}

impl CallerCapabilities {
    pub fn new(user_id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            user_id: user_id.into(),
            access_level,
            skip_queue: false,
        }
    }

    pub fn with_skip_queue(mut self, skip_queue: bool) -> Self {
        self.skip_queue = skip_queue;
        self
    }
}

/// Performs the side effects of a dequeued job.
///
/// The scheduler only observes whether `execute` returns before the lane
/// timeout. Success or failure is the executor's business and is reported
/// through the job's [`ReplyHandle`].
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(&self, job: Arc<Job>);
}

#[async_trait]
impl<F, Fut> WorkExecutor for F
where
    F: Fn(Arc<Job>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn execute(&self, job: Arc<Job>) {
        (self)(job).await
    }
}

/// A unit of generation work plus its routing metadata.
#[derive(Clone)]
pub struct Job {
    pub id: Uuid,
    /// Workflow or model identifier. Unknown identifiers are lightweight jobs.
    pub workflow: String,
    /// Free-form request text handed to the executor.
    pub prompt: String,
    pub caller: CallerCapabilities,
    pub executor: Arc<dyn WorkExecutor>,
    /// Where the asynchronous failure notice goes.
    pub reply: ReplyHandle,
    pub created_at: DateTime<Utc>,
    lane: Option<Lane>,
}

impl Job {
    pub fn new(
        workflow: impl Into<String>,
        prompt: impl Into<String>,
        caller: CallerCapabilities,
        executor: Arc<dyn WorkExecutor>,
        reply: ReplyHandle,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow: workflow.into(),
            prompt: prompt.into(),
            caller,
            executor,
            reply,
            created_at: Utc::now(),
            lane: None,
        }
    }

    /// Lane chosen at admission, if routed yet.
    pub fn lane(&self) -> Option<Lane> {
        self.lane
    }

    /// Record the lane. Only the first assignment sticks.
    pub(crate) fn assign_lane(&mut self, lane: Lane) -> bool {
        if self.lane.is_some() {
            return false;
        }
        self.lane = Some(lane);
        true
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("workflow", &self.workflow)
            .field("caller", &self.caller)
            .field("lane", &self.lane)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
