//! Azure Service Bus adapter (REST, SAS auth).
//!
//! Queue receives use peek-lock: the lock token travels in the message's
//! receipt handle as `{message_id}/{lock_token}` and settlement is a DELETE
//! (complete) or PUT (abandon) against the lock URI. The full [`Message`]
//! envelope is the message body, so priority and metadata survive; Service
//! Bus delivers in arrival order regardless of priority.
//!
//! Dead-lettering is native: `MaxDeliveryCount` on the entity moves
//! exhausted messages to the built-in `$DeadLetterQueue` sub-queue.
//! Subscriptions are Service Bus topic subscriptions, each drained by a
//! polling task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{instrument, warn};
use uuid::Uuid;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    Message, MessageBus, MessageHandler, MessagePriority, QueueConfig, QueueStats,
};

use crate::config_map::AdapterConfig;
use crate::sign::sas_token;

const SERVICE: &str = "service_bus";
const API_VERSION: &str = "2021-05";
const TOKEN_TTL_SECS: i64 = 300;
const POLL_WAIT_SECS: u64 = 10;

pub struct ServiceBusAdapter {
    core: Arc<SbCore>,
    subscriptions: Mutex<HashMap<String, SubscriptionTask>>,
}

struct SbCore {
    http: reqwest::Client,
    endpoint: String,
    key_name: String,
    key: String,
}

struct SubscriptionTask {
    poller: JoinHandle<()>,
    topic: String,
    subscription_name: String,
}

impl ServiceBusAdapter {
    /// Defaults target a local emulator: endpoint
    /// `http://localhost:5672`, key name `RootManageSharedAccessKey`. Real
    /// namespaces use `https://{namespace}.servicebus.windows.net`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or(
            "endpoint",
            &format!(
                "https://{}.servicebus.windows.net",
                cfg.str_or("namespace", "localhost")
            ),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.u64_or("request_timeout_secs", 60)))
            .build()
            .map_err(|e| wrap("client", e.to_string(), None, Some(Box::new(e))))?;
        Ok(Self {
            core: Arc::new(SbCore {
                http,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                key_name: cfg.str_or("key_name", "RootManageSharedAccessKey"),
                key: cfg.str_or("key", ""),
            }),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }
}

impl SbCore {
    fn authorization(&self) -> String {
        let expiry = (Utc::now().timestamp() + TOKEN_TTL_SECS) as u64;
        sas_token(&self.endpoint, &self.key_name, &self.key, expiry)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        content_type: Option<&str>,
        operation: &str,
        target: &str,
    ) -> Result<reqwest::Response, InfrastructureError> {
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.endpoint))
            .header("authorization", self.authorization());
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| wrap(operation, e.to_string(), Some(target), Some(Box::new(e))))
    }

    /// Management PUT of an ATOM entry; 409 (already exists) is fine.
    async fn put_entity(
        &self,
        path: &str,
        description: &str,
        operation: &str,
        target: &str,
    ) -> Result<(), InfrastructureError> {
        let body = format!(
            r#"<entry xmlns="http://www.w3.org/2005/Atom"><content type="application/xml">{description}</content></entry>"#
        );
        let response = self
            .request(
                Method::PUT,
                &format!("{path}?api-version={API_VERSION}"),
                Some(body),
                Some("application/atom+xml;type=entry;charset=utf-8"),
                operation,
                target,
            )
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::CONFLICT {
            return Err(wrap(operation, format!("http status {status}"), Some(target), None));
        }
        Ok(())
    }

    async fn delete_entity(
        &self,
        path: &str,
        operation: &str,
        target: &str,
    ) -> Result<(), InfrastructureError> {
        let response = self
            .request(
                Method::DELETE,
                &format!("{path}?api-version={API_VERSION}"),
                None,
                None,
                operation,
                target,
            )
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(wrap(operation, format!("http status {status}"), Some(target), None));
        }
        Ok(())
    }

    /// Peek-lock one message from `entity_path`; `None` when the wait timed
    /// out. The returned message's `topic` is set to `topic` (queue name for
    /// queue receives, topic name for subscription receives).
    async fn receive_one(
        &self,
        entity_path: &str,
        topic: &str,
        wait_secs: u64,
    ) -> Result<Option<Message>, InfrastructureError> {
        let response = self
            .request(
                Method::POST,
                &format!("{entity_path}/messages/head?timeout={wait_secs}"),
                Some(String::new()),
                None,
                "receive_from_queue",
                topic,
            )
            .await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(wrap(
                "receive_from_queue",
                format!("http status {status}"),
                Some(topic),
                None,
            ));
        }
        let broker: Value = response
            .headers()
            .get("brokerproperties")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(Value::Null);
        let body = response
            .text()
            .await
            .map_err(|e| wrap("receive_from_queue", e.to_string(), Some(topic), Some(Box::new(e))))?;

        let message_id = broker["MessageId"].as_str().unwrap_or_default().to_string();
        let lock_token = broker["LockToken"].as_str().unwrap_or_default().to_string();
        let delivery_count = broker["DeliveryCount"].as_u64().unwrap_or(1) as u32;

        let mut message: Message = serde_json::from_str(&body).unwrap_or_else(|_| Message {
            id: message_id.clone(),
            topic: topic.to_string(),
            payload: serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone())),
            priority: MessagePriority::Normal,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: 0,
            metadata: BTreeMap::new(),
            receipt_handle: None,
        });
        message.topic = topic.to_string();
        message.retry_count = delivery_count.saturating_sub(1).max(message.retry_count);
        message.receipt_handle = Some(format!("{message_id}/{lock_token}"));
        Ok(Some(message))
    }

    /// Settle a peek-locked message: complete (DELETE) or abandon (PUT).
    async fn settle(
        &self,
        entity_path: &str,
        receipt_handle: &str,
        complete: bool,
        operation: &str,
        target: &str,
    ) -> Result<(), InfrastructureError> {
        let method = if complete { Method::DELETE } else { Method::PUT };
        let response = self
            .request(
                method,
                &format!("{entity_path}/messages/{receipt_handle}"),
                None,
                None,
                operation,
                target,
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(wrap(operation, format!("http status {status}"), Some(target), None));
        }
        Ok(())
    }
}

fn receipt_of<'a>(message: &'a Message, operation: &str) -> Result<&'a str, InfrastructureError> {
    message.receipt_handle.as_deref().ok_or_else(|| {
        wrap(
            operation,
            format!("message '{}' carries no receipt handle", message.id),
            Some(&message.topic),
            None,
        )
    })
}

#[async_trait]
impl MessageBus for ServiceBusAdapter {
    #[instrument(skip(self, payload, metadata), err)]
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError> {
        let message = envelope(topic, payload, priority, metadata);
        let body = serde_json::to_string(&message)
            .map_err(|e| wrap("publish", e.to_string(), Some(topic), Some(Box::new(e))))?;
        let response = self
            .core
            .request(
                Method::POST,
                &format!("/{topic}/messages"),
                Some(body),
                Some("application/json"),
                "publish",
                topic,
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(wrap("publish", format!("http status {status}"), Some(topic), None));
        }
        Ok(message.id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
        max_concurrent: usize,
    ) -> Result<String, InfrastructureError> {
        let subscription_id = Uuid::now_v7().to_string();
        let subscription_name = format!("sub-{}", &subscription_id[subscription_id.len() - 12..]);
        self.core
            .put_entity(
                &format!("/{topic}/subscriptions/{subscription_name}"),
                r#"<SubscriptionDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect"><MaxDeliveryCount>10</MaxDeliveryCount></SubscriptionDescription>"#,
                "subscribe",
                topic,
            )
            .await?;

        let core = self.core.clone();
        let entity_path = format!("/{topic}/subscriptions/{subscription_name}");
        let poll_topic = topic.to_string();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let poller = tokio::spawn(async move {
            loop {
                match core.receive_one(&entity_path, &poll_topic, POLL_WAIT_SECS).await {
                    Ok(Some(mut message)) => {
                        let Some(receipt) = message.receipt_handle.take() else {
                            continue;
                        };
                        let handler = handler.clone();
                        let semaphore = semaphore.clone();
                        let core = core.clone();
                        let entity_path = entity_path.clone();
                        let poll_topic = poll_topic.clone();
                        tokio::spawn(async move {
                            let Ok(_permit) = semaphore.acquire_owned().await else {
                                return;
                            };
                            let complete = match handler.handle(message).await {
                                Ok(()) => true,
                                Err(e) => {
                                    warn!(error = %e, "message handler failed");
                                    false
                                }
                            };
                            if let Err(e) = core
                                .settle(&entity_path, &receipt, complete, "subscribe", &poll_topic)
                                .await
                            {
                                warn!(error = %e, "failed to settle message");
                            }
                        });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, topic = %poll_topic, "subscription poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        self.subscriptions.lock().await.insert(
            subscription_id.clone(),
            SubscriptionTask {
                poller,
                topic: topic.to_string(),
                subscription_name,
            },
        );
        Ok(subscription_id)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), InfrastructureError> {
        let Some(task) = self.subscriptions.lock().await.remove(subscription_id) else {
            return Ok(());
        };
        task.poller.abort();
        self.core
            .delete_entity(
                &format!("/{}/subscriptions/{}", task.topic, task.subscription_name),
                "unsubscribe",
                &task.topic,
            )
            .await
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
        let message = envelope(queue, payload, priority, metadata);
        let body = serde_json::to_string(&message)
            .map_err(|e| wrap("send_to_queue", e.to_string(), Some(queue), Some(Box::new(e))))?;
        let mut request = self
            .core
            .http
            .post(format!("{}/{queue}/messages", self.core.endpoint))
            .header("authorization", self.core.authorization())
            .header("content-type", "application/json");
        if delay_secs > 0 {
            let due = Utc::now() + chrono::Duration::seconds(delay_secs as i64);
            let broker = serde_json::json!({
                "MessageId": message.id,
                "ScheduledEnqueueTimeUtc": due.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            });
            request = request.header("brokerproperties", broker.to_string());
        }
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| wrap("send_to_queue", e.to_string(), Some(queue), Some(Box::new(e))))?;
        let status = response.status();
        if !status.is_success() {
            return Err(wrap("send_to_queue", format!("http status {status}"), Some(queue), None));
        }
        Ok(message.id)
    }

    async fn receive_from_queue(
        &self,
        queue: &str,
        max_messages: usize,
        wait_secs: u64,
    ) -> Result<Vec<Message>, InfrastructureError> {
        let mut out = Vec::new();
        while out.len() < max_messages {
            let wait = if out.is_empty() { wait_secs } else { 0 };
            match self.core.receive_one(&format!("/{queue}"), queue, wait).await? {
                Some(message) => out.push(message),
                None => break,
            }
        }
        Ok(out)
    }

    async fn acknowledge_message(&self, message: &Message) -> Result<(), InfrastructureError> {
        let receipt = receipt_of(message, "acknowledge_message")?;
        self.core
            .settle(
                &format!("/{}", message.topic),
                receipt,
                true,
                "acknowledge_message",
                &message.topic,
            )
            .await
    }

    async fn reject_message(
        &self,
        message: &Message,
        requeue: bool,
    ) -> Result<(), InfrastructureError> {
        let receipt = receipt_of(message, "reject_message")?;
        // Abandon either way; `MaxDeliveryCount` dead-letters the message
        // once its deliveries are exhausted.
        let _ = requeue;
        self.core
            .settle(
                &format!("/{}", message.topic),
                receipt,
                false,
                "reject_message",
                &message.topic,
            )
            .await
    }

    #[instrument(skip(self, config), err)]
    async fn create_queue(
        &self,
        name: &str,
        config: &QueueConfig,
    ) -> Result<(), InfrastructureError> {
        let description = queue_description(config);
        self.core
            .put_entity(&format!("/{name}"), &description, "create_queue", name)
            .await
    }

    async fn delete_queue(&self, name: &str) -> Result<(), InfrastructureError> {
        self.core.delete_entity(&format!("/{name}"), "delete_queue", name).await
    }

    async fn create_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        self.core
            .put_entity(
                &format!("/{name}"),
                r#"<TopicDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect"/>"#,
                "create_topic",
                name,
            )
            .await
    }

    async fn delete_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        self.core.delete_entity(&format!("/{name}"), "delete_topic", name).await
    }

    async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, InfrastructureError> {
        let response = self
            .core
            .request(
                Method::GET,
                &format!("/{queue}?api-version={API_VERSION}&enrich=true"),
                None,
                None,
                "get_queue_stats",
                queue,
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(wrap("get_queue_stats", format!("http status {status}"), Some(queue), None));
        }
        let xml = response
            .text()
            .await
            .map_err(|e| wrap("get_queue_stats", e.to_string(), Some(queue), Some(Box::new(e))))?;
        Ok(stats_from_description(queue, &xml))
    }

    async fn health_check(&self) -> bool {
        matches!(
            self.core
                .request(
                    Method::GET,
                    &format!("/$Resources/queues?api-version={API_VERSION}"),
                    None,
                    None,
                    "health_check",
                    "namespace",
                )
                .await,
            Ok(response) if response.status().is_success()
        )
    }
}

fn envelope(
    target: &str,
    payload: Value,
    priority: MessagePriority,
    metadata: Option<&BTreeMap<String, String>>,
) -> Message {
    Message {
        id: Uuid::now_v7().to_string(),
        topic: target.to_string(),
        payload,
        priority,
        created_at: Utc::now(),
        retry_count: 0,
        max_retries: 0,
        metadata: metadata.cloned().unwrap_or_default(),
        receipt_handle: None,
    }
}

fn queue_description(config: &QueueConfig) -> String {
    format!(
        r#"<QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect"><LockDuration>PT{}S</LockDuration><DefaultMessageTimeToLive>PT{}S</DefaultMessageTimeToLive><DeadLetteringOnMessageExpiration>true</DeadLetteringOnMessageExpiration><MaxDeliveryCount>{}</MaxDeliveryCount></QueueDescription>"#,
        config.visibility_timeout_secs.min(300),
        config.message_retention_secs,
        config.max_receive_count,
    )
}

fn stats_from_description(queue: &str, xml: &str) -> QueueStats {
    QueueStats {
        queue: queue.to_string(),
        visible_messages: xml_count(xml, "ActiveMessageCount"),
        in_flight_messages: 0,
        dead_lettered_messages: xml_count(xml, "DeadLetterMessageCount"),
    }
}

/// First numeric text content of `tag` (namespace prefixes ignored).
fn xml_count(xml: &str, tag: &str) -> u64 {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => inside = e.local_name().as_ref() == tag.as_bytes(),
            Ok(Event::Text(t)) if inside => {
                return t
                    .unescape()
                    .ok()
                    .and_then(|text| text.parse().ok())
                    .unwrap_or(0);
            }
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Eof) | Err(_) => return 0,
            _ => {}
        }
    }
}

fn wrap(
    operation: &str,
    message: impl Into<String>,
    target: Option<&str>,
    source: Option<cloudlift_core::BoxError>,
) -> InfrastructureError {
    InfrastructureError::MessageBus {
        service: SERVICE.to_string(),
        operation: operation.to_string(),
        message: message.into(),
        target: target.map(str::to_string),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_description_carries_the_config() {
        let description = queue_description(&QueueConfig {
            max_receive_count: 5,
            visibility_timeout_secs: 45,
            message_retention_secs: 86400,
        });
        assert!(description.contains("<LockDuration>PT45S</LockDuration>"));
        assert!(description.contains("<DefaultMessageTimeToLive>PT86400S</DefaultMessageTimeToLive>"));
        assert!(description.contains("<MaxDeliveryCount>5</MaxDeliveryCount>"));
    }

    #[test]
    fn lock_duration_is_capped_at_the_service_limit() {
        let description = queue_description(&QueueConfig {
            max_receive_count: 3,
            visibility_timeout_secs: 4000,
            message_retention_secs: 60,
        });
        assert!(description.contains("<LockDuration>PT300S</LockDuration>"));
    }

    #[test]
    fn counts_parse_from_namespaced_description() {
        let xml = r#"<entry xmlns="http://www.w3.org/2005/Atom">
          <content type="application/xml">
            <QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect">
              <CountDetails xmlns:d3p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">
                <d3p1:ActiveMessageCount>7</d3p1:ActiveMessageCount>
                <d3p1:DeadLetterMessageCount>2</d3p1:DeadLetterMessageCount>
              </CountDetails>
            </QueueDescription>
          </content>
        </entry>"#;
        let stats = stats_from_description("jobs", xml);
        assert_eq!(stats.visible_messages, 7);
        assert_eq!(stats.dead_lettered_messages, 2);
        assert_eq!(stats.queue, "jobs");
    }

    #[test]
    fn missing_counts_default_to_zero() {
        let stats = stats_from_description("jobs", "<QueueDescription/>");
        assert_eq!(stats.visible_messages, 0);
        assert_eq!(stats.dead_lettered_messages, 0);
    }
}
