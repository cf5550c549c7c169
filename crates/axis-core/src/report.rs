//! Status report handed to notification

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resource::Resource;
use crate::state::WorkflowState;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub name: String,
    /// Workflow status reported by the orchestrator (Succeeded, Failed, Error)
    pub status: String,
    pub generated_at: DateTime<Utc>,
    pub resource: Resource,
    pub state: WorkflowState,
}

impl StatusReport {
    pub fn new(resource: Resource, state: WorkflowState, status: impl Into<String>) -> Self {
        Self {
            name: resource.metadata.name.clone(),
            status: status.into(),
            generated_at: Utc::now(),
            resource,
            state,
        }
    }

    pub fn title(&self) -> String {
        format!("Provisioning AXIS '{}' {}!", self.name, self.status)
    }

    pub fn subtitle(&self) -> String {
        format!("{} UTC", self.generated_at.format("%Y-%m-%dT%H:%M:%S"))
    }

    /// Pretty-printed resource description for the report body
    pub fn resource_text(&self) -> String {
        serde_json::to_string_pretty(&self.resource).unwrap_or_else(|_| self.name.clone())
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }
}
