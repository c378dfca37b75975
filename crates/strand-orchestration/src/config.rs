//! Orchestrator configuration.
//!
//! Construction-time knobs for the worker pool, instance cache, and queue
//! backend selection, with an environment-driven loader. Malformed
//! environment values fall back to the defaults with a warning rather than
//! failing startup.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use strand_queue_core::{MessageQueue, QueueBackendKind, QueueError};
use strand_queue_memory::InMemoryQueue;

/// Environment variable selecting the worker count.
pub const ENV_MAX_WORKERS: &str = "MAX_WORKERS";
/// Environment variable selecting the cleanup pass interval, in seconds.
pub const ENV_CLEANUP_INTERVAL: &str = "TASK_CLEANUP_INTERVAL";
/// Environment variable selecting the instance idle timeout, in seconds.
pub const ENV_INSTANCE_TIMEOUT: &str = "INSTANCE_TIMEOUT";
/// Environment variable bounding the number of live agent instances.
pub const ENV_MAX_CONCURRENT_AGENTS: &str = "MAX_CONCURRENT_AGENTS";
/// Environment variable selecting the queue backend.
pub const ENV_MESSAGE_QUEUE_TYPE: &str = "MESSAGE_QUEUE_TYPE";

/// Construction-time configuration of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of cooperative workers draining the primary queue.
    pub max_workers: usize,
    /// Interval between instance-cache cleanup passes.
    pub cleanup_interval: Duration,
    /// Idle time after which a cached instance is destroyed.
    pub instance_timeout: Duration,
    /// Upper bound on total live agent instances.
    pub max_instances: usize,
    /// Queue backend to construct when none is injected.
    pub queue_backend: QueueBackendKind,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            cleanup_interval: Duration::from_secs(3600),
            instance_timeout: Duration::from_secs(7200),
            max_instances: 100,
            queue_backend: QueueBackendKind::Memory,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for absent or malformed values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: env_value(ENV_MAX_WORKERS, defaults.max_workers),
            cleanup_interval: Duration::from_secs(env_value(
                ENV_CLEANUP_INTERVAL,
                defaults.cleanup_interval.as_secs(),
            )),
            instance_timeout: Duration::from_secs(env_value(
                ENV_INSTANCE_TIMEOUT,
                defaults.instance_timeout.as_secs(),
            )),
            max_instances: env_value(ENV_MAX_CONCURRENT_AGENTS, defaults.max_instances),
            queue_backend: env_value(ENV_MESSAGE_QUEUE_TYPE, defaults.queue_backend),
        }
    }

    /// Set the worker count.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the cleanup pass interval.
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    /// Set the instance idle timeout.
    pub fn with_instance_timeout(mut self, instance_timeout: Duration) -> Self {
        self.instance_timeout = instance_timeout;
        self
    }

    /// Set the live-instance bound.
    pub fn with_max_instances(mut self, max_instances: usize) -> Self {
        self.max_instances = max_instances;
        self
    }
}

fn env_value<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring malformed environment value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Construct the queue backend selected by the configuration.
///
/// Only the in-memory backend is available in-process; the broker-backed
/// kinds are recognized but report
/// [`QueueError::BackendUnavailable`]. External deployments inject their
/// own [`MessageQueue`] implementation instead.
pub fn build_queue_backend(kind: QueueBackendKind) -> Result<Arc<dyn MessageQueue>, QueueError> {
    match kind {
        QueueBackendKind::Memory => Ok(Arc::new(InMemoryQueue::new())),
        other => Err(QueueError::BackendUnavailable(other.to_string())),
    }
}
