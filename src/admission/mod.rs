//! Admission — live hardware availability and per-caller eligibility.
//!
//! The scheduler consults an [`AdmissionPolicy`] while holding its routing
//! lock, so implementations must bound their own latency. The concrete
//! [`LiveAdmissionPolicy`] caches a [`HardwareStatus`] from a
//! [`StatusSource`] and times out slow probes.

pub mod policy;
pub mod probe;
pub mod workflows;

pub use policy::LiveAdmissionPolicy;
pub use probe::{HttpStatusSource, StaticStatusSource};
pub use workflows::WorkflowRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;
use crate::queue::{AccessLevel, CallerCapabilities};

/// Admission metadata for a known generation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    /// Minimum access level needed to run this workflow at all.
    #[serde(default)]
    pub required_access: AccessLevel,
    /// Big workflows only fit the high-performance lane.
    #[serde(default)]
    pub big: bool,
}

impl WorkflowMetadata {
    pub fn new(name: impl Into<String>, required_access: AccessLevel) -> Self {
        Self {
            name: name.into(),
            required_access,
            big: false,
        }
    }

    pub fn big(mut self) -> Self {
        self.big = true;
        self
    }
}

/// Looks up workflow metadata. `None` means the identifier is not a known
/// workflow and the job is treated as lightweight.
pub trait WorkflowMetadataProvider: Send + Sync {
    fn lookup(&self, identifier: &str) -> Option<WorkflowMetadata>;
}

/// Point-in-time availability of the two backing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareStatus {
    /// A competing foreground process occupies the high-performance GPU.
    pub foreground_active: bool,
    pub high_reachable: bool,
    pub low_reachable: bool,
}

impl HardwareStatus {
    /// Both services up, nothing competing.
    pub fn available() -> Self {
        Self {
            foreground_active: false,
            high_reachable: true,
            low_reachable: true,
        }
    }

    /// Nothing known to be reachable.
    pub fn unreachable() -> Self {
        Self {
            foreground_active: false,
            high_reachable: false,
            low_reachable: false,
        }
    }

    /// The high-performance lane can take work right now.
    pub fn high_lane_usable(&self) -> bool {
        self.high_reachable && !self.foreground_active
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub status: HardwareStatus,
    /// The caller, at its access level, may use the high-performance lane
    /// for this workflow.
    pub entitled: bool,
}

impl Eligibility {
    pub fn use_high_lane(&self) -> bool {
        self.entitled && self.status.high_lane_usable()
    }
}

/// Decides whether a caller/job pair may use the high-performance lane.
#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn check_eligibility(
        &self,
        job_id: &str,
        workflow: &WorkflowMetadata,
        caller: &CallerCapabilities,
    ) -> Result<Eligibility, AdmissionError>;
}

/// Source of live hardware status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self) -> Result<HardwareStatus, AdmissionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_lane_needs_entitlement_and_hardware() {
        let ok = Eligibility {
            status: HardwareStatus::available(),
            entitled: true,
        };
        assert!(ok.use_high_lane());

        let not_entitled = Eligibility {
            entitled: false,
            ..ok
        };
        assert!(!not_entitled.use_high_lane());

        let gaming = Eligibility {
            status: HardwareStatus {
                foreground_active: true,
                ..HardwareStatus::available()
            },
            entitled: true,
        };
        assert!(!gaming.use_high_lane());
    }

    #[test]
    fn workflow_metadata_defaults() {
        let meta: WorkflowMetadata = serde_json::from_str(r#"{"name": "sdxl"}"#).unwrap();
        assert_eq!(meta.required_access, AccessLevel::Guest);
        assert!(!meta.big);
    }
}
