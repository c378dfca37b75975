//! Per-conversation agent instances and their cache.
//!
//! An [`AgentInstance`] binds an immutable agent snapshot to one stateful
//! conversation. The [`InstanceCache`] guarantees at-most-one live instance
//! per `(agent, task)` key, touches activity on every hit, and evicts
//! instances that idle past the timeout or push the cache over its
//! capacity bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use strand_agents::AgentRepository;
use strand_types::{Agent, AgentId};

use crate::error::OrchestratorError;

/// Compose the cache key of an `(agent, task)` pair.
pub fn instance_key(agent_id: &AgentId, task_id: Option<&str>) -> String {
    match task_id {
        Some(task_id) => format!("{agent_id}#{task_id}"),
        None => agent_id.to_string(),
    }
}

/// In-memory binding of an agent to a conversation. Never serialized.
#[derive(Debug, Clone)]
pub struct AgentInstance {
    /// Agent this instance executes.
    pub agent_id: AgentId,
    /// Conversation this instance serves, when stateful.
    pub task_id: Option<String>,
    /// Immutable snapshot of the agent record at creation time.
    pub agent: Agent,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// Last time a request was dispatched to this instance.
    pub last_activity: DateTime<Utc>,
    /// Requests dispatched to this instance.
    pub message_count: u64,
}

impl AgentInstance {
    fn new(agent_id: AgentId, task_id: Option<String>, agent: Agent) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            task_id,
            agent,
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }

    /// Cache key of this instance.
    pub fn instance_key(&self) -> String {
        instance_key(&self.agent_id, self.task_id.as_deref())
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
        self.message_count += 1;
    }
}

/// Serializable snapshot of one cached instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    /// Cache key.
    pub instance_key: String,
    /// Agent id component of the key.
    pub agent_id: AgentId,
    /// Task id component of the key, when present.
    pub task_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last dispatch timestamp.
    pub last_activity: DateTime<Utc>,
    /// Requests dispatched so far.
    pub message_count: u64,
}

/// Cache of live agent instances, one per `(agent, task)` key.
///
/// A single mutex guards the map: lookups, creations, destroys, and
/// eviction passes are atomic with respect to each other, which is what
/// makes get-or-create single-flight per key.
pub struct InstanceCache {
    repository: Arc<dyn AgentRepository>,
    instances: Mutex<HashMap<String, AgentInstance>>,
    instance_timeout: Duration,
    max_instances: usize,
}

impl InstanceCache {
    /// Create a cache over the given repository.
    pub fn new(
        repository: Arc<dyn AgentRepository>,
        instance_timeout: Duration,
        max_instances: usize,
    ) -> Self {
        Self {
            repository,
            instances: Mutex::new(HashMap::new()),
            instance_timeout,
            max_instances,
        }
    }

    /// Fetch the live instance for a key, creating it on first use.
    ///
    /// Every successful call touches `last_activity` and increments the
    /// message count. On a miss the agent is loaded from the repository; a
    /// missing record surfaces [`OrchestratorError::AgentNotFound`] and
    /// creates nothing. Returns a snapshot of the instance.
    pub async fn get_or_create(
        &self,
        agent_id: &AgentId,
        task_id: Option<&str>,
    ) -> Result<AgentInstance, OrchestratorError> {
        let key = instance_key(agent_id, task_id);
        let mut instances = self.instances.lock().await;

        if let Some(instance) = instances.get_mut(&key) {
            instance.touch();
            debug!(
                instance_key = %key,
                message_count = instance.message_count,
                "reusing agent instance"
            );
            return Ok(instance.clone());
        }

        // Holding the lock across the load keeps creation single-flight.
        let agent = self.repository.get(agent_id).await?;
        debug!(agent = %agent.name, template = %agent.template_id, "loaded agent record");

        let mut instance =
            AgentInstance::new(agent_id.clone(), task_id.map(str::to_string), agent);
        instance.touch();
        instances.insert(key.clone(), instance.clone());
        info!(
            instance_key = %key,
            total_instances = instances.len(),
            "created agent instance"
        );
        Ok(instance)
    }

    /// Destroy the instance for a key; returns `false` if none was live.
    pub async fn destroy(&self, agent_id: &AgentId, task_id: Option<&str>) -> bool {
        let key = instance_key(agent_id, task_id);
        let removed = self.instances.lock().await.remove(&key).is_some();
        if removed {
            info!(instance_key = %key, "destroyed agent instance");
        }
        removed
    }

    /// Summaries of every live instance.
    pub async fn list(&self) -> Vec<InstanceSummary> {
        self.instances
            .lock()
            .await
            .values()
            .map(|instance| InstanceSummary {
                instance_key: instance.instance_key(),
                agent_id: instance.agent_id.clone(),
                task_id: instance.task_id.clone(),
                created_at: instance.created_at,
                last_activity: instance.last_activity,
                message_count: instance.message_count,
            })
            .collect()
    }

    /// Number of live instances.
    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    /// Whether the cache holds no instances.
    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }

    /// One eviction pass: drop idle-expired instances, then drop the
    /// least-recently-active ones beyond the capacity bound. Returns how
    /// many instances were destroyed.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut instances = self.instances.lock().await;

        let expired: Vec<String> = instances
            .iter()
            .filter(|(_, instance)| {
                let idle = now
                    .signed_duration_since(instance.last_activity)
                    .to_std()
                    .unwrap_or_default();
                idle > self.instance_timeout
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            instances.remove(key);
            info!(instance_key = %key, "evicted idle agent instance");
        }
        let mut evicted = expired.len();

        // Capacity bound: shed the least-recently-active beyond the cap.
        if instances.len() > self.max_instances {
            let mut by_activity: Vec<(String, DateTime<Utc>)> = instances
                .iter()
                .map(|(key, instance)| (key.clone(), instance.last_activity))
                .collect();
            by_activity.sort_by_key(|(_, last_activity)| *last_activity);
            let overflow = instances.len() - self.max_instances;
            for (key, _) in by_activity.into_iter().take(overflow) {
                instances.remove(&key);
                info!(instance_key = %key, "evicted agent instance over capacity");
                evicted += 1;
            }
        }

        evicted
    }

    /// Destroy every instance. Used on orchestrator shutdown.
    pub async fn clear(&self) {
        let mut instances = self.instances.lock().await;
        for key in instances.keys() {
            debug!(instance_key = %key, "destroying agent instance");
        }
        instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_agents::InMemoryAgentRepository;
    use strand_types::AgentConfiguration;

    async fn seeded_repository() -> (Arc<InMemoryAgentRepository>, AgentId) {
        let repository = Arc::new(InMemoryAgentRepository::new());
        let mut agent =
            Agent::new("greeter", "conversation", AgentConfiguration::default()).unwrap();
        agent.activate();
        let id = agent.id.clone();
        repository.save(agent).await.unwrap();
        (repository, id)
    }

    fn cache(repository: Arc<InMemoryAgentRepository>) -> InstanceCache {
        InstanceCache::new(repository, Duration::from_secs(3600), 100)
    }

    #[tokio::test]
    async fn key_composition() {
        let agent_id = AgentId::from("a1");
        assert_eq!(instance_key(&agent_id, Some("t1")), "a1#t1");
        assert_eq!(instance_key(&agent_id, None), "a1");
    }

    #[tokio::test]
    async fn reuse_keeps_one_instance_and_counts_messages() {
        let (repository, id) = seeded_repository().await;
        let cache = cache(repository);

        let first = cache.get_or_create(&id, Some("t1")).await.unwrap();
        assert_eq!(first.message_count, 1);
        let second = cache.get_or_create(&id, Some("t1")).await.unwrap();
        assert_eq!(second.message_count, 2);
        assert_eq!(cache.len().await, 1);

        let summaries = cache.list().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 2);
    }

    #[tokio::test]
    async fn distinct_tasks_get_distinct_instances() {
        let (repository, id) = seeded_repository().await;
        let cache = cache(repository);
        cache.get_or_create(&id, Some("t1")).await.unwrap();
        cache.get_or_create(&id, Some("t2")).await.unwrap();
        cache.get_or_create(&id, None).await.unwrap();
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn missing_agent_creates_nothing() {
        let (repository, _) = seeded_repository().await;
        let cache = cache(repository);
        let err = cache
            .get_or_create(&AgentId::from("ghost"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentNotFound(_)));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn destroy_semantics() {
        let (repository, id) = seeded_repository().await;
        let cache = cache(repository);
        cache.get_or_create(&id, Some("t1")).await.unwrap();
        assert!(cache.destroy(&id, Some("t1")).await);
        assert!(!cache.destroy(&id, Some("t1")).await);
    }

    #[tokio::test]
    async fn cleanup_evicts_idle_instances() {
        let (repository, id) = seeded_repository().await;
        let cache = InstanceCache::new(repository, Duration::from_secs(0), 100);
        cache.get_or_create(&id, Some("t1")).await.unwrap();
        // Zero timeout: anything with measurable idle time expires.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.cleanup().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn cleanup_enforces_capacity_bound() {
        let (repository, id) = seeded_repository().await;
        let cache = InstanceCache::new(repository, Duration::from_secs(3600), 2);
        for task in ["t1", "t2", "t3", "t4"] {
            cache.get_or_create(&id, Some(task)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.cleanup().await, 2);
        assert_eq!(cache.len().await, 2);

        // The most recently active instances survive.
        let mut keys: Vec<String> = cache
            .list()
            .await
            .into_iter()
            .map(|summary| summary.instance_key)
            .collect();
        keys.sort();
        assert!(keys[0].ends_with("t3"));
        assert!(keys[1].ends_with("t4"));
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let (repository, id) = seeded_repository().await;
        let cache = cache(repository);
        cache.get_or_create(&id, Some("t1")).await.unwrap();
        cache.get_or_create(&id, Some("t2")).await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
