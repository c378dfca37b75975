#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **strand-queue-memory** – In-process reference queue for the Strand runtime.
//!
//! This crate provides a fast, non-persistent [`MessageQueue`] backend
//! suitable for single-process deployments, development, and testing. All
//! state lives behind one mutex and is lost when the process terminates.
//!
//! Known limitations, by design of the reference backend: `delay_seconds`
//! and per-queue `ttl_seconds` are stored but not honored, and blocking
//! receives poll at a short fixed interval rather than parking on a
//! notifier.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use strand_queue_core::{
    MessageQueue, MessageStatus, QueueError, QueueMessage, QueueStats, SendOptions,
};

/// Interval between polls while a receive call waits for a message.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

//─────────────────────────────
//  Per-queue state
//─────────────────────────────

#[derive(Debug, Default)]
struct QueueState {
    /// Pending messages, kept sorted by priority class, FIFO within a class.
    pending: VecDeque<QueueMessage>,
    /// Messages delivered to a consumer and awaiting ack or reject.
    in_flight: Vec<QueueMessage>,
    /// Capacity bound enforced on send.
    max_size: Option<usize>,
    /// Stored but not enforced by this backend.
    #[allow(dead_code)]
    ttl_seconds: Option<u64>,
    /// Messages acknowledged since queue creation.
    completed: usize,
    /// Messages dead-lettered since queue creation.
    failed: usize,
}

impl QueueState {
    /// Insert at the tail of the message's priority class: after every
    /// pending message of equal or higher priority, before the first one of
    /// strictly lower priority. Requeued messages therefore keep their
    /// priority without jumping ahead of their class.
    fn insert_by_priority(&mut self, message: QueueMessage) {
        let position = self
            .pending
            .iter()
            .position(|existing| existing.priority < message.priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, message);
    }
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, QueueState>,
    initialized: bool,
}

//─────────────────────────────
//  In-memory backend
//─────────────────────────────

/// In-process, non-persistent message queue.
///
/// A single mutex guards every queue's pending and in-flight lists plus the
/// stats counters, so each operation is atomic with respect to all others
/// and multiple consumers can compete on one queue safely.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueue {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryQueue {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn stats_of(queue_name: &str, state: &QueueState) -> QueueStats {
        QueueStats {
            queue_name: queue_name.to_string(),
            total_messages: state.pending.len() + state.in_flight.len(),
            pending_messages: state.pending.len(),
            processing_messages: state.in_flight.len(),
            completed_messages: state.completed,
            failed_messages: state.failed,
            last_updated: Utc::now(),
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn initialize(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        if !inner.initialized {
            info!("initializing in-memory message queue");
            inner.initialized = true;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), QueueError> {
        info!("shutting down in-memory message queue");
        let mut inner = self.inner.lock().await;
        inner.queues.clear();
        inner.initialized = false;
        Ok(())
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        max_size: Option<usize>,
        ttl_seconds: Option<u64>,
    ) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        if inner.queues.contains_key(queue_name) {
            return Ok(false);
        }
        inner.queues.insert(
            queue_name.to_string(),
            QueueState {
                max_size,
                ttl_seconds,
                ..QueueState::default()
            },
        );
        info!(queue = queue_name, "created queue");
        Ok(true)
    }

    async fn delete_queue(&self, queue_name: &str) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        let removed = inner.queues.remove(queue_name).is_some();
        if removed {
            info!(queue = queue_name, "deleted queue");
        }
        Ok(removed)
    }

    async fn purge_queue(&self, queue_name: &str) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(state) = inner.queues.get_mut(queue_name) else {
            return Ok(0);
        };
        let count = state.pending.len() + state.in_flight.len();
        state.pending.clear();
        state.in_flight.clear();
        info!(queue = queue_name, count, "purged queue");
        Ok(count)
    }

    async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let inner = self.inner.lock().await;
        Ok(inner.queues.keys().cloned().collect())
    }

    async fn send_message(
        &self,
        queue_name: &str,
        payload: Value,
        options: SendOptions,
    ) -> Result<String, QueueError> {
        let message = QueueMessage::create(queue_name, payload)
            .with_priority(options.priority)
            .with_delay_seconds(options.delay_seconds)
            .with_correlation_id(options.correlation_id)
            .with_reply_to(options.reply_to)
            .with_metadata(options.metadata.unwrap_or_default());
        let message_id = message.id.clone();

        let mut inner = self.inner.lock().await;
        let state = inner.queues.entry(queue_name.to_string()).or_default();
        if let Some(max_size) = state.max_size {
            if state.pending.len() >= max_size {
                return Err(QueueError::QueueFull {
                    queue: queue_name.to_string(),
                    max_size,
                });
            }
        }
        state.insert_by_priority(message);
        debug!(queue = queue_name, message_id = %message_id, "sent message");
        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue_name: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<Option<QueueMessage>, QueueError> {
        let messages = self.receive_messages(queue_name, 1, timeout_seconds).await?;
        Ok(messages.into_iter().next())
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        timeout_seconds: Option<u64>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline =
            timeout_seconds.map(|seconds| Instant::now() + Duration::from_secs(seconds));
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(state) = inner.queues.get_mut(queue_name) {
                    if !state.pending.is_empty() {
                        let mut messages = Vec::new();
                        while messages.len() < max_messages {
                            let Some(mut message) = state.pending.pop_front() else {
                                break;
                            };
                            message.status = MessageStatus::Processing;
                            message.updated_at = Utc::now();
                            state.in_flight.push(message.clone());
                            messages.push(message);
                        }
                        debug!(
                            queue = queue_name,
                            count = messages.len(),
                            "received messages"
                        );
                        return Ok(messages);
                    }
                }
            }

            match deadline {
                None => return Ok(Vec::new()),
                Some(deadline) if Instant::now() >= deadline => return Ok(Vec::new()),
                Some(_) => tokio::time::sleep(RECEIVE_POLL_INTERVAL).await,
            }
        }
    }

    async fn acknowledge_message(&self, message: &QueueMessage) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(state) = inner.queues.get_mut(&message.queue_name) else {
            return Ok(false);
        };
        let Some(position) = state
            .in_flight
            .iter()
            .position(|in_flight| in_flight.id == message.id)
        else {
            return Ok(false);
        };
        state.in_flight.remove(position);
        state.completed += 1;
        debug!(queue = %message.queue_name, message_id = %message.id, "acknowledged message");
        Ok(true)
    }

    async fn reject_message(
        &self,
        message: &QueueMessage,
        requeue: bool,
        reason: Option<String>,
    ) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock().await;
        let Some(state) = inner.queues.get_mut(&message.queue_name) else {
            return Ok(false);
        };
        let Some(position) = state
            .in_flight
            .iter()
            .position(|in_flight| in_flight.id == message.id)
        else {
            return Ok(false);
        };
        let mut rejected = state.in_flight.remove(position);
        rejected.updated_at = Utc::now();
        if let Some(reason) = reason {
            rejected
                .metadata
                .insert("reject_reason".to_string(), Value::String(reason));
        }

        if requeue && rejected.can_retry() {
            rejected.retry_count += 1;
            rejected.status = MessageStatus::Retry;
            debug!(
                queue = %message.queue_name,
                message_id = %message.id,
                retry = rejected.retry_count,
                max_retries = rejected.max_retries,
                "requeued message"
            );
            state.insert_by_priority(rejected);
        } else {
            rejected.status = MessageStatus::Failed;
            state.failed += 1;
            warn!(
                queue = %message.queue_name,
                message_id = %message.id,
                "dead-lettered message"
            );
        }
        Ok(true)
    }

    async fn get_queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError> {
        let inner = self.inner.lock().await;
        Ok(match inner.queues.get(queue_name) {
            Some(state) => Self::stats_of(queue_name, state),
            None => QueueStats::empty(queue_name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_queue_core::MessagePriority;

    async fn send_with_priority(
        queue: &InMemoryQueue,
        name: &str,
        label: &str,
        priority: MessagePriority,
    ) -> String {
        queue
            .send_message(
                name,
                json!({ "label": label }),
                SendOptions::with_priority(priority),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn delivers_higher_priority_first() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "normal", MessagePriority::Normal).await;
        send_with_priority(&queue, "q", "high", MessagePriority::High).await;
        send_with_priority(&queue, "q", "low", MessagePriority::Low).await;
        send_with_priority(&queue, "q", "urgent", MessagePriority::Urgent).await;

        let mut labels = Vec::new();
        while let Some(message) = queue.receive_message("q", None).await.unwrap() {
            labels.push(message.payload["label"].as_str().unwrap().to_string());
            queue.acknowledge_message(&message).await.unwrap();
        }
        assert_eq!(labels, vec!["urgent", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn fifo_within_a_priority_class() {
        let queue = InMemoryQueue::new();
        for label in ["first", "second", "third"] {
            send_with_priority(&queue, "q", label, MessagePriority::Normal).await;
        }
        let messages = queue.receive_messages("q", 3, None).await.unwrap();
        let labels: Vec<_> = messages
            .iter()
            .map(|m| m.payload["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn batch_receive_is_a_priority_order_prefix() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "low", MessagePriority::Low).await;
        send_with_priority(&queue, "q", "urgent", MessagePriority::Urgent).await;
        send_with_priority(&queue, "q", "normal-a", MessagePriority::Normal).await;
        send_with_priority(&queue, "q", "normal-b", MessagePriority::Normal).await;

        let messages = queue.receive_messages("q", 3, None).await.unwrap();
        let labels: Vec<_> = messages
            .iter()
            .map(|m| m.payload["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["urgent", "normal-a", "normal-b"]);

        let remaining = queue.receive_message("q", None).await.unwrap().unwrap();
        assert_eq!(remaining.payload["label"], "low");
    }

    #[tokio::test]
    async fn requeue_preserves_priority_at_class_tail() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "high-a", MessagePriority::High).await;
        send_with_priority(&queue, "q", "low", MessagePriority::Low).await;

        let first = queue.receive_message("q", None).await.unwrap().unwrap();
        assert_eq!(first.payload["label"], "high-a");

        // Another high-priority message arrives while high-a is in flight.
        send_with_priority(&queue, "q", "high-b", MessagePriority::High).await;

        // Requeue keeps priority but goes behind high-b, still ahead of low.
        assert!(queue
            .reject_message(&first, true, Some("transient".to_string()))
            .await
            .unwrap());

        let mut labels = Vec::new();
        while let Some(message) = queue.receive_message("q", None).await.unwrap() {
            labels.push(message.payload["label"].as_str().unwrap().to_string());
            queue.acknowledge_message(&message).await.unwrap();
        }
        assert_eq!(labels, vec!["high-b", "high-a", "low"]);
    }

    #[tokio::test]
    async fn requeue_records_retry_and_reason() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "m", MessagePriority::Normal).await;
        let message = queue.receive_message("q", None).await.unwrap().unwrap();
        queue
            .reject_message(&message, true, Some("blip".to_string()))
            .await
            .unwrap();

        let retried = queue.receive_message("q", None).await.unwrap().unwrap();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.status, MessageStatus::Retry);
        assert_eq!(retried.metadata["reject_reason"], json!("blip"));
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "poison", MessagePriority::Normal).await;

        for _ in 0..3 {
            let message = queue.receive_message("q", None).await.unwrap().unwrap();
            queue.reject_message(&message, true, None).await.unwrap();
        }
        let message = queue.receive_message("q", None).await.unwrap().unwrap();
        assert_eq!(message.retry_count, 3);
        queue.reject_message(&message, true, None).await.unwrap();

        // Budget exhausted: gone for good.
        assert!(queue.receive_message("q", None).await.unwrap().is_none());
        let stats = queue.get_queue_stats("q").await.unwrap();
        assert_eq!(stats.failed_messages, 1);
        assert_eq!(stats.total_messages, 0);
    }

    #[tokio::test]
    async fn acknowledge_twice_is_idempotent() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "m", MessagePriority::Normal).await;
        let message = queue.receive_message("q", None).await.unwrap().unwrap();
        assert!(queue.acknowledge_message(&message).await.unwrap());
        assert!(!queue.acknowledge_message(&message).await.unwrap());
        assert!(!queue.reject_message(&message, true, None).await.unwrap());
    }

    #[tokio::test]
    async fn empty_receive_with_zero_timeout_returns_promptly() {
        let queue = InMemoryQueue::new();
        let started = std::time::Instant::now();
        let message = queue.receive_message("empty", Some(0)).await.unwrap();
        assert!(message.is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn blocking_receive_sees_later_send() {
        let queue = InMemoryQueue::new();
        let receiver = queue.clone();
        let handle =
            tokio::spawn(async move { receiver.receive_message("late", Some(5)).await.unwrap() });
        tokio::time::sleep(Duration::from_millis(250)).await;
        send_with_priority(&queue, "late", "arrived", MessagePriority::Normal).await;

        let message = handle.await.unwrap().unwrap();
        assert_eq!(message.payload["label"], "arrived");
    }

    #[tokio::test]
    async fn bounded_queue_refuses_when_full() {
        let queue = InMemoryQueue::new();
        queue.create_queue("small", Some(2), None).await.unwrap();
        for label in ["a", "b"] {
            send_with_priority(&queue, "small", label, MessagePriority::Normal).await;
        }
        let err = queue
            .send_message("small", json!({}), SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { max_size: 2, .. }));
    }

    #[tokio::test]
    async fn create_delete_purge_semantics() {
        let queue = InMemoryQueue::new();
        assert!(queue.create_queue("q", None, None).await.unwrap());
        assert!(!queue.create_queue("q", None, None).await.unwrap());

        send_with_priority(&queue, "q", "a", MessagePriority::Normal).await;
        send_with_priority(&queue, "q", "b", MessagePriority::Normal).await;
        let _held = queue.receive_message("q", None).await.unwrap().unwrap();

        assert_eq!(queue.purge_queue("q").await.unwrap(), 2);
        assert_eq!(queue.purge_queue("missing").await.unwrap(), 0);
        assert!(queue.delete_queue("q").await.unwrap());
        assert!(!queue.delete_queue("q").await.unwrap());
    }

    #[tokio::test]
    async fn stats_stay_consistent_across_operations() {
        let queue = InMemoryQueue::new();
        send_with_priority(&queue, "q", "a", MessagePriority::Normal).await;
        send_with_priority(&queue, "q", "b", MessagePriority::Normal).await;

        let stats = queue.get_queue_stats("q").await.unwrap();
        assert_eq!((stats.pending_messages, stats.processing_messages), (2, 0));

        let message = queue.receive_message("q", None).await.unwrap().unwrap();
        let stats = queue.get_queue_stats("q").await.unwrap();
        assert_eq!((stats.pending_messages, stats.processing_messages), (1, 1));

        queue.acknowledge_message(&message).await.unwrap();
        let stats = queue.get_queue_stats("q").await.unwrap();
        assert_eq!((stats.pending_messages, stats.processing_messages), (1, 0));
        assert_eq!(stats.completed_messages, 1);
    }

    #[tokio::test]
    async fn shutdown_drops_all_state() {
        let queue = InMemoryQueue::new();
        queue.initialize().await.unwrap();
        send_with_priority(&queue, "q", "a", MessagePriority::Normal).await;
        queue.shutdown().await.unwrap();
        assert!(queue.list_queues().await.unwrap().is_empty());
        // Shutdown after shutdown is a no-op.
        queue.shutdown().await.unwrap();
    }
}
