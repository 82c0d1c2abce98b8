//! Hardware status sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{HardwareStatus, StatusSource};
use crate::error::AdmissionError;

/// Probes each backend's health endpoint over HTTP.
///
/// A 2xx response means reachable. The optional foreground endpoint answers
/// `{"active": bool}`; when it cannot be read the GPU is assumed occupied.
pub struct HttpStatusSource {
    client: reqwest::Client,
    high_url: String,
    low_url: String,
    foreground_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForegroundReport {
    active: bool,
}

impl HttpStatusSource {
    pub fn new(
        high_url: impl Into<String>,
        low_url: impl Into<String>,
        foreground_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdmissionError::ProbeFailed {
                backend: "http".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            high_url: high_url.into(),
            low_url: low_url.into(),
            foreground_url,
        })
    }

    async fn reachable(&self, backend: &str, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(backend, status = %resp.status(), "Backend health check failed");
                false
            }
            Err(e) => {
                tracing::warn!(backend, error = %e, "Backend unreachable");
                false
            }
        }
    }

    async fn foreground_active(&self) -> bool {
        let Some(url) = &self.foreground_url else {
            return false;
        };

        let report = async {
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<ForegroundReport>()
                .await
        };

        match report.await {
            Ok(report) => report.active,
            Err(e) => {
                tracing::warn!(error = %e, "Foreground status unavailable, assuming busy");
                true
            }
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<HardwareStatus, AdmissionError> {
        let (high_reachable, low_reachable, foreground_active) = tokio::join!(
            self.reachable("high", &self.high_url),
            self.reachable("low", &self.low_url),
            self.foreground_active(),
        );

        Ok(HardwareStatus {
            foreground_active,
            high_reachable,
            low_reachable,
        })
    }
}

/// Fixed status, adjustable at runtime. Used when no probe endpoints are
/// configured, and in tests.
pub struct StaticStatusSource {
    status: RwLock<HardwareStatus>,
    delay: RwLock<Option<Duration>>,
    fetches: AtomicUsize,
}

impl StaticStatusSource {
    pub fn new(status: HardwareStatus) -> Self {
        Self {
            status: RwLock::new(status),
            delay: RwLock::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub async fn set(&self, status: HardwareStatus) {
        *self.status.write().await = status;
    }

    /// Make every fetch take `delay` before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StatusSource for StaticStatusSource {
    async fn fetch(&self) -> Result<HardwareStatus, AdmissionError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.status.read().await)
    }
}
