//! In-process message bus for local development and tests.
//!
//! Queues and topics are created implicitly on first use (queues with
//! default settings; `create_queue` overrides them). Timing runs on the
//! tokio clock, so paused-time tests can drive visibility timeouts
//! deterministically.
//!
//! Dead-lettering moves a message to the `{queue}-dlq` queue, which is an
//! ordinary queue and can be received from like any other.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::time::{Duration, Instant};
use tracing::{instrument, warn};
use uuid::Uuid;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    Message, MessageBus, MessageHandler, MessagePriority, QueueConfig, QueueStats,
};

const SERVICE: &str = "in_memory";

#[derive(Default)]
pub struct InMemoryMessageAdapter {
    state: Mutex<BusState>,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, Queue>,
    topics: HashMap<String, ()>,
    subscriptions: HashMap<String, Subscription>,
    seq: u64,
}

struct Queue {
    config: QueueConfig,
    ready: Vec<QueuedMessage>,
    in_flight: HashMap<String, InFlight>,
    notify: Arc<Notify>,
}

struct QueuedMessage {
    message: Message,
    seq: u64,
    receive_count: u32,
    visible_at: Instant,
    expires_at: Instant,
}

struct InFlight {
    message: Message,
    seq: u64,
    receive_count: u32,
    deadline: Instant,
    expires_at: Instant,
}

struct Subscription {
    topic: String,
    handler: Arc<dyn MessageHandler>,
    semaphore: Arc<Semaphore>,
}

impl Queue {
    fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: Vec::new(),
            in_flight: HashMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Index of the next message to deliver: highest priority first, then
    /// enqueue order.
    fn best_visible(&self, now: Instant) -> Option<usize> {
        self.ready
            .iter()
            .enumerate()
            .filter(|(_, m)| m.visible_at <= now)
            .max_by(|(_, a), (_, b)| {
                a.message
                    .priority
                    .cmp(&b.message.priority)
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i)
    }

    /// Earliest instant at which a currently hidden message becomes
    /// deliverable.
    fn next_wakeup(&self, now: Instant) -> Option<Instant> {
        let delayed = self.ready.iter().filter(|m| m.visible_at > now).map(|m| m.visible_at);
        let deadlines = self.in_flight.values().map(|f| f.deadline);
        delayed.chain(deadlines).min()
    }
}

impl BusState {
    fn ensure_queue(&mut self, name: &str) -> &mut Queue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(QueueConfig::default()))
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Apply retention and visibility deadlines to one queue.
    fn reap(&mut self, queue_name: &str, now: Instant) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };
        queue.ready.retain(|m| m.expires_at > now);
        let max_receive_count = queue.config.max_receive_count;
        let expired: Vec<String> = queue
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        let mut dead = Vec::new();
        let mut requeued = false;
        for handle in expired {
            let Some(mut in_flight) = queue.in_flight.remove(&handle) else {
                continue;
            };
            in_flight.message.receipt_handle = None;
            if in_flight.receive_count >= max_receive_count {
                dead.push(in_flight.message);
            } else {
                in_flight.message.retry_count += 1;
                queue.ready.push(QueuedMessage {
                    message: in_flight.message,
                    seq: in_flight.seq,
                    receive_count: in_flight.receive_count,
                    visible_at: now,
                    expires_at: in_flight.expires_at,
                });
                requeued = true;
            }
        }
        if requeued {
            queue.notify.notify_one();
        }
        if !dead.is_empty() {
            self.dead_letter(queue_name, dead, now);
        }
    }

    fn dead_letter(&mut self, queue_name: &str, messages: Vec<Message>, now: Instant) {
        let dlq_name = dead_letter_queue(queue_name);
        for message in messages {
            warn!(queue = queue_name, id = %message.id, "dead-lettering message");
            let seq = self.next_seq();
            let dlq = self.ensure_queue(&dlq_name);
            let expires_at = now + Duration::from_secs(dlq.config.message_retention_secs);
            dlq.ready.push(QueuedMessage {
                message,
                seq,
                receive_count: 0,
                visible_at: now,
                expires_at,
            });
            dlq.notify.notify_one();
        }
    }
}

fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}-dlq")
}

fn new_message(
    topic: &str,
    payload: Value,
    priority: MessagePriority,
    metadata: Option<&BTreeMap<String, String>>,
    max_retries: u32,
) -> Message {
    Message {
        id: Uuid::now_v7().to_string(),
        topic: topic.to_string(),
        payload,
        priority,
        created_at: Utc::now(),
        retry_count: 0,
        max_retries,
        metadata: metadata.cloned().unwrap_or_default(),
        receipt_handle: None,
    }
}

fn handle_error(operation: &str, message: &Message) -> InfrastructureError {
    InfrastructureError::MessageBus {
        service: SERVICE.to_string(),
        operation: operation.to_string(),
        message: format!("unknown or expired receipt handle for message '{}'", message.id),
        target: Some(message.topic.clone()),
        source: None,
    }
}

impl InMemoryMessageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the in-flight record a delivered message refers to.
    async fn take_in_flight(
        &self,
        operation: &str,
        message: &Message,
    ) -> Result<InFlight, InfrastructureError> {
        let handle = message
            .receipt_handle
            .as_deref()
            .ok_or_else(|| handle_error(operation, message))?;
        let mut state = self.state.lock().await;
        state.reap(&message.topic, Instant::now());
        state
            .queues
            .get_mut(&message.topic)
            .and_then(|q| q.in_flight.remove(handle))
            .ok_or_else(|| handle_error(operation, message))
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageAdapter {
    #[instrument(skip(self, payload, metadata), err)]
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError> {
        let message = new_message(topic, payload, priority, metadata, 0);
        let id = message.id.clone();
        let targets: Vec<(Arc<dyn MessageHandler>, Arc<Semaphore>)> = {
            let mut state = self.state.lock().await;
            state.topics.entry(topic.to_string()).or_default();
            state
                .subscriptions
                .values()
                .filter(|s| s.topic == topic)
                .map(|s| (s.handler.clone(), s.semaphore.clone()))
                .collect()
        };
        for (handler, semaphore) in targets {
            let message = message.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Err(e) = handler.handle(message).await {
                    warn!(error = %e, "message handler failed");
                }
            });
        }
        Ok(id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
        max_concurrent: usize,
    ) -> Result<String, InfrastructureError> {
        let id = Uuid::now_v7().to_string();
        let mut state = self.state.lock().await;
        state.topics.entry(topic.to_string()).or_default();
        state.subscriptions.insert(
            id.clone(),
            Subscription {
                topic: topic.to_string(),
                handler,
                semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            },
        );
        Ok(id)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), InfrastructureError> {
        self.state.lock().await.subscriptions.remove(subscription_id);
        Ok(())
    }

    #[instrument(skip(self, payload, metadata), err)]
    async fn send_to_queue(
        &self,
        queue: &str,
        payload: Value,
        delay_secs: u64,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let seq = state.next_seq();
        let entry = state.ensure_queue(queue);
        let message = new_message(queue, payload, priority, metadata, entry.config.max_receive_count);
        let id = message.id.clone();
        entry.ready.push(QueuedMessage {
            message,
            seq,
            receive_count: 0,
            visible_at: now + Duration::from_secs(delay_secs),
            expires_at: now + Duration::from_secs(entry.config.message_retention_secs),
        });
        entry.notify.notify_one();
        Ok(id)
    }

    async fn receive_from_queue(
        &self,
        queue: &str,
        max_messages: usize,
        wait_secs: u64,
    ) -> Result<Vec<Message>, InfrastructureError> {
        let deadline = Instant::now() + Duration::from_secs(wait_secs);
        loop {
            let (notify, next_wakeup) = {
                let now = Instant::now();
                let mut state = self.state.lock().await;
                state.ensure_queue(queue);
                state.reap(queue, now);
                let entry = state
                    .queues
                    .get_mut(queue)
                    .ok_or_else(|| InfrastructureError::message_bus(SERVICE, "receive", "queue vanished"))?;
                let visibility = Duration::from_secs(entry.config.visibility_timeout_secs);
                let mut delivered = Vec::new();
                while delivered.len() < max_messages {
                    let Some(index) = entry.best_visible(now) else {
                        break;
                    };
                    let mut queued = entry.ready.remove(index);
                    let handle = Uuid::now_v7().to_string();
                    queued.receive_count += 1;
                    queued.message.receipt_handle = Some(handle.clone());
                    delivered.push(queued.message.clone());
                    entry.in_flight.insert(
                        handle,
                        InFlight {
                            message: queued.message,
                            seq: queued.seq,
                            receive_count: queued.receive_count,
                            deadline: now + visibility,
                            expires_at: queued.expires_at,
                        },
                    );
                }
                if !delivered.is_empty() {
                    return Ok(delivered);
                }
                (entry.notify.clone(), entry.next_wakeup(now))
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_wakeup.map_or(deadline, |w| w.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notify.notified()).await;
        }
    }

    async fn acknowledge_message(&self, message: &Message) -> Result<(), InfrastructureError> {
        self.take_in_flight("acknowledge_message", message).await?;
        Ok(())
    }

    async fn reject_message(
        &self,
        message: &Message,
        requeue: bool,
    ) -> Result<(), InfrastructureError> {
        let mut in_flight = self.take_in_flight("reject_message", message).await?;
        let now = Instant::now();
        in_flight.message.receipt_handle = None;
        let mut state = self.state.lock().await;
        if requeue {
            in_flight.message.retry_count += 1;
            let Some(entry) = state.queues.get_mut(&message.topic) else {
                return Ok(());
            };
            entry.ready.push(QueuedMessage {
                message: in_flight.message,
                seq: in_flight.seq,
                receive_count: in_flight.receive_count,
                visible_at: now,
                expires_at: in_flight.expires_at,
            });
            entry.notify.notify_one();
        } else {
            state.dead_letter(&message.topic, vec![in_flight.message], now);
        }
        Ok(())
    }

    async fn create_queue(
        &self,
        name: &str,
        config: &QueueConfig,
    ) -> Result<(), InfrastructureError> {
        let mut state = self.state.lock().await;
        match state.queues.get_mut(name) {
            Some(queue) => queue.config = config.clone(),
            None => {
                state.queues.insert(name.to_string(), Queue::new(config.clone()));
            }
        }
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), InfrastructureError> {
        self.state.lock().await.queues.remove(name);
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        self.state.lock().await.topics.insert(name.to_string(), ());
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        let mut state = self.state.lock().await;
        state.topics.remove(name);
        state.subscriptions.retain(|_, s| s.topic != name);
        Ok(())
    }

    async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, InfrastructureError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.reap(queue, now);
        let entry = state.queues.get(queue).ok_or_else(|| {
            InfrastructureError::message_bus(SERVICE, "get_queue_stats", format!("unknown queue '{queue}'"))
        })?;
        let visible = entry.ready.iter().filter(|m| m.visible_at <= now).count() as u64;
        let in_flight = entry.in_flight.len() as u64;
        let dead = state
            .queues
            .get(&dead_letter_queue(queue))
            .map(|q| q.ready.len() as u64)
            .unwrap_or(0);
        Ok(QueueStats {
            queue: queue.to_string(),
            visible_messages: visible,
            in_flight_messages: in_flight,
            dead_lettered_messages: dead,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
