//! Agent entity.
//!
//! An [`Agent`] is a configured, addressable executable: a template plus a
//! configuration plus an identity. The runtime core only ever reads agent
//! records; they are owned and mutated by the repository side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgentConfiguration, AgentId, Metadata, ValidationError};

/// Lifecycle status of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Record exists but has never been activated.
    Created,
    /// Agent accepts execution requests.
    Active,
    /// Agent was deliberately taken out of service.
    Inactive,
    /// Agent is in a faulted state and must not execute.
    Error,
}

/// A configured agent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Identity of the record.
    pub id: AgentId,
    /// Human-readable name.
    pub name: String,
    /// Template this agent instantiates.
    pub template_id: String,
    /// Template version pin; executors fall back to their default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,
    /// Immutable configuration snapshot.
    pub configuration: AgentConfiguration,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Opaque record metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Agent {
    /// Create a new agent record in the `Created` status with a fresh id.
    pub fn new(
        name: impl Into<String>,
        template_id: impl Into<String>,
        configuration: AgentConfiguration,
    ) -> Result<Self, ValidationError> {
        Self::with_id(AgentId::generate(), name, template_id, configuration)
    }

    /// Create a new agent record with a caller-supplied id.
    pub fn with_id(
        id: AgentId,
        name: impl Into<String>,
        template_id: impl Into<String>,
        configuration: AgentConfiguration,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyAgentName);
        }
        let template_id = template_id.into();
        if template_id.is_empty() {
            return Err(ValidationError::EmptyTemplateId);
        }
        let now = Utc::now();
        Ok(Self {
            id,
            name,
            template_id,
            template_version: None,
            configuration,
            status: AgentStatus::Created,
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
        })
    }

    /// Pin the template version.
    pub fn with_template_version(mut self, version: impl Into<String>) -> Self {
        self.template_version = Some(version.into());
        self
    }

    /// Move the record into the given status and touch `updated_at`.
    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Activate the agent.
    pub fn activate(&mut self) {
        self.set_status(AgentStatus::Active);
    }

    /// Deactivate the agent.
    pub fn deactivate(&mut self) {
        self.set_status(AgentStatus::Inactive);
    }

    /// Mark the agent as faulted.
    pub fn mark_error(&mut self) {
        self.set_status(AgentStatus::Error);
    }

    /// Whether the agent currently accepts execution requests.
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    /// Whether the agent is executable: active with a non-empty template id.
    pub fn is_executable(&self) -> bool {
        self.is_active() && !self.template_id.is_empty()
    }

    /// Template version, falling back to the conventional default pin.
    pub fn template_version_or_default(&self) -> &str {
        self.template_version.as_deref().unwrap_or("v1.0.0")
    }

    /// Resolved configuration mapping handed to the executor.
    pub fn template_configuration(&self) -> Metadata {
        self.configuration.resolve_template_configuration()
    }
}
