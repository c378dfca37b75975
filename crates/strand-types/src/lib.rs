#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-types** – Shared primitive data structures for the Strand runtime.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It holds the value objects the orchestrator, queue, and executor layers
//! exchange: identifiers, chat messages, agent records and their
//! configuration, and the template configuration schema.

use serde::{Deserialize, Serialize};
use std::fmt;

//─────────────────────────────
//  Modules
//─────────────────────────────

pub mod agent;
pub mod config;
pub mod message;
pub mod template;

pub use agent::{Agent, AgentStatus};
pub use config::AgentConfiguration;
pub use message::{ChatMessage, MessageRole};
pub use template::{ConfigField, ConfigFieldValidation, FieldType, TemplateInfo};

//─────────────────────────────
//  Common aliases
//─────────────────────────────

/// Free-form metadata carried on messages, requests, and results.
///
/// Keys are opaque to the core; values are arbitrary JSON. Every layer that
/// forwards metadata must forward it unchanged.
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// Opaque identifier of a configured agent record.
///
/// Agent ids are plain strings, generated as UUIDs unless supplied by the
/// caller. The runtime never inspects their structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Generate a fresh random agent id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Generate a fresh UUID string for task, message, and correlation ids.
///
/// Tasks, messages, and contexts are identified by plain strings; this is
/// the single place they are minted so the format stays uniform.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

//─────────────────────────────
//  Validation errors
//─────────────────────────────

/// Errors raised by validating constructors of the value types in this crate.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// Chat message content was empty.
    #[error("message content cannot be empty")]
    EmptyContent,
    /// Agent name was empty.
    #[error("agent name cannot be empty")]
    EmptyAgentName,
    /// Agent template id was empty.
    #[error("template id cannot be empty")]
    EmptyTemplateId,
    /// Temperature outside the accepted `[0.0, 2.0]` range.
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    TemperatureOutOfRange(f64),
    /// `max_tokens` was zero or negative.
    #[error("max_tokens must be a positive integer, got {0}")]
    MaxTokensNotPositive(i64),
    /// A template config field had an empty key.
    #[error("config field key cannot be empty")]
    EmptyFieldKey,
    /// A required template metadata field was empty.
    #[error("template {0} cannot be empty")]
    EmptyTemplateField(&'static str),
}
