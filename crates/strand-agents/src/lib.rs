#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-agents** – Agent repository abstraction for the Strand runtime.
//!
//! The orchestrator materializes an agent's template and configuration by
//! reading records from an [`AgentRepository`]. The runtime core only ever
//! reads; the write side exists so embedders and tests can seed records.
//! The in-memory implementation here is the reference backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use strand_types::{Agent, AgentId};

//─────────────────────────────
//  Errors
//─────────────────────────────

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No record exists for the requested agent id.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),
    /// The backing store failed in a backend-specific way.
    #[error("repository backend failure: {0}")]
    Backend(String),
}

//─────────────────────────────
//  Repository trait
//─────────────────────────────

/// Read-mostly store of agent records.
///
/// Implementations must be safe for concurrent use; the orchestrator's
/// workers call [`get`](Self::get) from many tasks at once.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Fetch a record by id.
    async fn get(&self, id: &AgentId) -> Result<Agent, RepositoryError>;

    /// Insert or replace a record.
    async fn save(&self, agent: Agent) -> Result<(), RepositoryError>;

    /// All stored records, in unspecified order.
    async fn list(&self) -> Result<Vec<Agent>, RepositoryError>;

    /// Remove a record; returns `false` if it did not exist.
    async fn remove(&self, id: &AgentId) -> Result<bool, RepositoryError>;
}

//─────────────────────────────
//  In-memory implementation
//─────────────────────────────

/// Non-persistent agent repository backed by a read-write locked map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Whether the repository holds no records.
    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn get(&self, id: &AgentId) -> Result<Agent, RepositoryError> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::AgentNotFound(id.clone()))
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        self.agents.write().await.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn remove(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        Ok(self.agents.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_types::AgentConfiguration;

    fn sample_agent(name: &str) -> Agent {
        let mut agent = Agent::new(name, "conversation", AgentConfiguration::default()).unwrap();
        agent.activate();
        agent
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let repo = InMemoryAgentRepository::new();
        let agent = sample_agent("greeter");
        let id = agent.id.clone();
        repo.save(agent.clone()).await.unwrap();
        assert_eq!(repo.get(&id).await.unwrap(), agent);
    }

    #[tokio::test]
    async fn missing_agent_is_not_found() {
        let repo = InMemoryAgentRepository::new();
        let err = repo.get(&AgentId::from("nope")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AgentNotFound(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn save_replaces_existing_record() {
        let repo = InMemoryAgentRepository::new();
        let mut agent = sample_agent("greeter");
        repo.save(agent.clone()).await.unwrap();
        agent.deactivate();
        repo.save(agent.clone()).await.unwrap();
        assert_eq!(repo.len().await, 1);
        assert!(!repo.get(&agent.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn list_and_remove() {
        let repo = InMemoryAgentRepository::new();
        let first = sample_agent("one");
        let second = sample_agent("two");
        repo.save(first.clone()).await.unwrap();
        repo.save(second).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);

        assert!(repo.remove(&first.id).await.unwrap());
        assert!(!repo.remove(&first.id).await.unwrap());
        assert_eq!(repo.len().await, 1);
    }
}
