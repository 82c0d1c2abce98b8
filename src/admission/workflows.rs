//! Workflow registry — known generation workflows and their admission rules.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{WorkflowMetadata, WorkflowMetadataProvider};
use crate::error::AdmissionError;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    workflows: Vec<WorkflowMetadata>,
}

/// In-memory workflow catalogue. Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowMetadata>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, workflow: WorkflowMetadata) -> Self {
        self.insert(workflow);
        self
    }

    pub fn insert(&mut self, workflow: WorkflowMetadata) {
        self.workflows
            .insert(workflow.name.to_lowercase(), workflow);
    }

    /// Parse `{"workflows": [...]}`.
    pub fn from_json_str(raw: &str) -> Result<Self, AdmissionError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        let mut registry = Self::new();
        for workflow in file.workflows {
            if workflow.name.trim().is_empty() {
                return Err(AdmissionError::Registry(
                    "workflow with empty name".to_string(),
                ));
            }
            let key = workflow.name.to_lowercase();
            if registry.workflows.contains_key(&key) {
                return Err(AdmissionError::Registry(format!(
                    "duplicate workflow '{}'",
                    workflow.name
                )));
            }
            registry.insert(workflow);
        }
        Ok(registry)
    }

    pub async fn load(path: &Path) -> Result<Self, AdmissionError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let registry = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            count = registry.len(),
            "Loaded workflow registry"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Workflow names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.values().map(|w| w.name.clone()).collect();
        names.sort();
        names
    }
}

impl WorkflowMetadataProvider for WorkflowRegistry {
    fn lookup(&self, identifier: &str) -> Option<WorkflowMetadata> {
        self.workflows.get(&identifier.to_lowercase()).cloned()
    }
}
