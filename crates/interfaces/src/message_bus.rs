//! Message bus contract: pub/sub topics plus point-to-point queues.
//!
//! ## Per-message state machine
//!
//! `published -> delivered -> (acknowledged | rejected -> [requeued ->
//! delivered | dead-lettered]) -> terminal`
//!
//! A delivered message that is not acknowledged within the queue's
//! visibility timeout becomes visible again. After `max_receive_count`
//! unacknowledged deliveries the adapter's dead-lettering policy applies.
//! `retry_count` is mutated only by the bus adapter on redelivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cloudlift_core::{BoxError, InfrastructureError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Bus envelope. `receipt_handle` is set by the adapter on delivery and is
/// what `acknowledge_message`/`reject_message` use to address the in-flight
/// delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub payload: Value,
    pub priority: MessagePriority,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: BTreeMap<String, String>,
    pub receipt_handle: Option<String>,
}

/// Queue creation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Deliveries before dead-lettering.
    pub max_receive_count: u32,
    pub visibility_timeout_secs: u64,
    pub message_retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_receive_count: 3,
            visibility_timeout_secs: 30,
            message_retention_secs: 4 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    pub visible_messages: u64,
    pub in_flight_messages: u64,
    pub dead_lettered_messages: u64,
}

/// Subscriber callback for topic subscriptions. Errors are logged by the
/// adapter; they do not tear the subscription down.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<(), BoxError>;
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish to a topic, fan-out to all subscribers. Returns the message id.
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError>;

    /// Subscribe a handler to a topic; at most `max_concurrent` handler
    /// invocations run at once. Returns a subscription id.
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
        max_concurrent: usize,
    ) -> Result<String, InfrastructureError>;

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), InfrastructureError>;

    /// Enqueue a message, optionally delayed. Returns the message id.
    async fn send_to_queue(
        &self,
        queue: &str,
        payload: Value,
        delay_secs: u64,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError>;

    /// Receive up to `max_messages`, waiting up to `wait_secs` for the first.
    /// Received messages stay invisible for the queue's visibility timeout.
    async fn receive_from_queue(
        &self,
        queue: &str,
        max_messages: usize,
        wait_secs: u64,
    ) -> Result<Vec<Message>, InfrastructureError>;

    /// Remove a delivered message permanently.
    async fn acknowledge_message(&self, message: &Message) -> Result<(), InfrastructureError>;

    /// Give up on a delivery. `requeue` makes it immediately visible again;
    /// otherwise the adapter's dead-letter policy applies.
    async fn reject_message(
        &self,
        message: &Message,
        requeue: bool,
    ) -> Result<(), InfrastructureError>;

    async fn create_queue(
        &self,
        name: &str,
        config: &QueueConfig,
    ) -> Result<(), InfrastructureError>;

    async fn delete_queue(&self, name: &str) -> Result<(), InfrastructureError>;

    async fn create_topic(&self, name: &str) -> Result<(), InfrastructureError>;

    async fn delete_topic(&self, name: &str) -> Result<(), InfrastructureError>;

    async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, InfrastructureError>;

    async fn health_check(&self) -> bool;
}
