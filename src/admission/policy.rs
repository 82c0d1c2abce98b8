//! Live admission policy with a short-lived status cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{AdmissionPolicy, Eligibility, HardwareStatus, StatusSource, WorkflowMetadata};
use crate::config::QueueConfig;
use crate::error::AdmissionError;
use crate::queue::{AccessLevel, CallerCapabilities};

struct CachedStatus {
    status: HardwareStatus,
    fetched_at: Instant,
}

/// Admission policy backed by a [`StatusSource`].
///
/// Status is reused for `ttl`. A probe slower than `probe_timeout`, or one
/// that errors, falls back to the last known status (or "nothing reachable"
/// when there is none), and that fallback is cached for a full `ttl`.
pub struct LiveAdmissionPolicy {
    source: Arc<dyn StatusSource>,
    ttl: Duration,
    probe_timeout: Duration,
    high_lane_min_access: AccessLevel,
    cache: RwLock<Option<CachedStatus>>,
}

impl LiveAdmissionPolicy {
    pub fn new(
        source: Arc<dyn StatusSource>,
        ttl: Duration,
        probe_timeout: Duration,
        high_lane_min_access: AccessLevel,
    ) -> Self {
        Self {
            source,
            ttl,
            probe_timeout,
            high_lane_min_access,
            cache: RwLock::new(None),
        }
    }

    pub fn from_config(source: Arc<dyn StatusSource>, config: &QueueConfig) -> Self {
        Self::new(
            source,
            config.status_cache_ttl,
            config.probe_timeout,
            config.high_lane_min_access,
        )
    }

    /// Current hardware status, from cache when fresh.
    pub async fn status(&self) -> HardwareStatus {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.ttl
            {
                return cached.status;
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return cached.status;
        }

        let fetched = match tokio::time::timeout(self.probe_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(AdmissionError::ProbeTimeout {
                timeout: self.probe_timeout,
            }),
        };

        let status = match fetched {
            Ok(status) => {
                tracing::debug!(?status, "Refreshed hardware status");
                status
            }
            Err(e) => {
                let fallback = cache
                    .as_ref()
                    .map(|c| c.status)
                    .unwrap_or_else(HardwareStatus::unreachable);
                tracing::warn!(error = %e, ?fallback, "Hardware status probe failed");
                fallback
            }
        };

        *cache = Some(CachedStatus {
            status,
            fetched_at: Instant::now(),
        });
        status
    }
}

#[async_trait]
impl AdmissionPolicy for LiveAdmissionPolicy {
    async fn check_eligibility(
        &self,
        job_id: &str,
        workflow: &WorkflowMetadata,
        caller: &CallerCapabilities,
    ) -> Result<Eligibility, AdmissionError> {
        let status = self.status().await;
        let needed = self.high_lane_min_access.max(workflow.required_access);
        let entitled = caller.access_level >= needed;

        tracing::debug!(
            job_id,
            workflow = %workflow.name,
            user = %caller.user_id,
            access = %caller.access_level,
            entitled,
            "Checked eligibility"
        );

        Ok(Eligibility { status, entitled })
    }
}
