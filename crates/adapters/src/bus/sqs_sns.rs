//! AWS adapter: SNS topics fanned out to SQS queues.
//!
//! Talks the AWS query protocol directly (form-encoded POST, SigV4, XML
//! responses), which also works against LocalStack. The full [`Message`]
//! envelope travels as the SQS/SNS body, so priority and metadata survive
//! the trip; SQS itself delivers in arrival order regardless of priority.
//!
//! Dead-lettering uses SQS redrive: `create_queue` provisions `{name}-dlq`
//! and points the main queue's redrive policy at it. Each topic
//! subscription gets its own SQS queue subscribed to the SNS topic and a
//! polling task that feeds the handler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{instrument, warn};
use uuid::Uuid;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    Message, MessageBus, MessageHandler, MessagePriority, QueueConfig, QueueStats,
};

use crate::config_map::AdapterConfig;
use crate::sign::{SigV4Signer, percent_encode};

const SERVICE: &str = "sqs_sns";
const SQS_API_VERSION: &str = "2012-11-05";
const SNS_API_VERSION: &str = "2010-03-31";
const POLL_WAIT_SECS: u64 = 10;

pub struct SqsSnsAdapter {
    core: Arc<AwsCore>,
    topic_arns: Mutex<HashMap<String, String>>,
    subscriptions: Mutex<HashMap<String, SubscriptionTask>>,
}

struct AwsCore {
    http: reqwest::Client,
    sqs_endpoint: String,
    sns_endpoint: String,
    region: String,
    account_id: String,
    sqs_signer: SigV4Signer,
    sns_signer: SigV4Signer,
}

struct SubscriptionTask {
    poller: JoinHandle<()>,
    subscription_arn: String,
    queue_name: String,
}

impl SqsSnsAdapter {
    /// Defaults target LocalStack: endpoint `http://localhost:4566`, region
    /// `us-east-1`, account `000000000000`, credentials `test`/`test`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or("endpoint", "http://localhost:4566");
        let region = cfg.str_or("region", "us-east-1");
        let access_key = cfg.str_or("access_key", "test");
        let secret_key = cfg.str_or("secret_key", "test");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.u64_or("request_timeout_secs", 30)))
            .build()
            .map_err(|e| wrap("client", e.to_string(), None, Some(Box::new(e))))?;
        Ok(Self {
            core: Arc::new(AwsCore {
                http,
                sqs_endpoint: cfg.str_or("sqs_endpoint", &endpoint).trim_end_matches('/').to_string(),
                sns_endpoint: cfg.str_or("sns_endpoint", &endpoint).trim_end_matches('/').to_string(),
                region: region.clone(),
                account_id: cfg.str_or("account_id", "000000000000"),
                sqs_signer: SigV4Signer::new(&access_key, &secret_key, &region, "sqs"),
                sns_signer: SigV4Signer::new(&access_key, &secret_key, &region, "sns"),
            }),
            topic_arns: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    async fn topic_arn(&self, topic: &str) -> String {
        let cached = self.topic_arns.lock().await.get(topic).cloned();
        cached.unwrap_or_else(|| self.core.default_topic_arn(topic))
    }
}

impl AwsCore {
    fn queue_path(&self, queue: &str) -> String {
        format!("/{}/{queue}", self.account_id)
    }

    fn queue_arn(&self, queue: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{queue}", self.region, self.account_id)
    }

    fn default_topic_arn(&self, topic: &str) -> String {
        format!("arn:aws:sns:{}:{}:{topic}", self.region, self.account_id)
    }

    async fn sqs_call(
        &self,
        path: &str,
        operation: &str,
        target: &str,
        params: Vec<(&str, String)>,
    ) -> Result<String, InfrastructureError> {
        self.call(&self.sqs_endpoint, path, &self.sqs_signer, operation, target, params)
            .await
    }

    async fn sns_call(
        &self,
        operation: &str,
        target: &str,
        params: Vec<(&str, String)>,
    ) -> Result<String, InfrastructureError> {
        self.call(&self.sns_endpoint, "/", &self.sns_signer, operation, target, params)
            .await
    }

    async fn call(
        &self,
        endpoint: &str,
        path: &str,
        signer: &SigV4Signer,
        operation: &str,
        target: &str,
        params: Vec<(&str, String)>,
    ) -> Result<String, InfrastructureError> {
        let body = form_body(&params);
        let content_type = "application/x-www-form-urlencoded";
        let signed = signer.sign_post(
            &host_of(endpoint),
            path,
            body.as_bytes(),
            content_type,
            &[],
            Utc::now(),
        );
        let response = self
            .http
            .post(format!("{endpoint}{path}"))
            .header("authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| wrap(operation, e.to_string(), Some(target), Some(Box::new(e))))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| wrap(operation, e.to_string(), Some(target), Some(Box::new(e))))?;
        if !status.is_success() {
            let code = xml_text(&text, "Code").unwrap_or_else(|| status.to_string());
            let message = xml_text(&text, "Message").unwrap_or_default();
            return Err(wrap(operation, format!("{code}: {message}"), Some(target), None));
        }
        Ok(text)
    }

    async fn receive_raw(
        &self,
        queue: &str,
        max_messages: usize,
        wait_secs: u64,
    ) -> Result<Vec<Message>, InfrastructureError> {
        let xml = self
            .sqs_call(
                &self.queue_path(queue),
                "receive_from_queue",
                queue,
                vec![
                    ("Action", "ReceiveMessage".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("MaxNumberOfMessages", max_messages.clamp(1, 10).to_string()),
                    ("WaitTimeSeconds", wait_secs.min(20).to_string()),
                    ("AttributeName.1", "ApproximateReceiveCount".to_string()),
                ],
            )
            .await?;
        Ok(parse_messages(&xml)
            .into_iter()
            .map(|raw| raw.into_message(queue))
            .collect())
    }

    async fn delete_message(
        &self,
        queue: &str,
        receipt_handle: &str,
    ) -> Result<(), InfrastructureError> {
        self.sqs_call(
            &self.queue_path(queue),
            "acknowledge_message",
            queue,
            vec![
                ("Action", "DeleteMessage".to_string()),
                ("Version", SQS_API_VERSION.to_string()),
                ("ReceiptHandle", receipt_handle.to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for SqsSnsAdapter {
    #[instrument(skip(self, payload, metadata), err)]
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        priority: MessagePriority,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError> {
        let message = envelope(topic, payload, priority, metadata);
        let body = encode_envelope(&message, "publish", topic)?;
        self.core
            .sns_call(
                "publish",
                topic,
                vec![
                    ("Action", "Publish".to_string()),
                    ("Version", SNS_API_VERSION.to_string()),
                    ("TopicArn", self.topic_arn(topic).await),
                    ("Message", body),
                ],
            )
            .await?;
        Ok(message.id)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
        max_concurrent: usize,
    ) -> Result<String, InfrastructureError> {
        let subscription_id = Uuid::now_v7().to_string();
        let queue_name = format!("{topic}-sub-{}", &subscription_id[subscription_id.len() - 12..]);

        self.core
            .sqs_call(
                "/",
                "subscribe",
                topic,
                vec![
                    ("Action", "CreateQueue".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("QueueName", queue_name.clone()),
                ],
            )
            .await?;
        let xml = self
            .core
            .sns_call(
                "subscribe",
                topic,
                vec![
                    ("Action", "Subscribe".to_string()),
                    ("Version", SNS_API_VERSION.to_string()),
                    ("TopicArn", self.topic_arn(topic).await),
                    ("Protocol", "sqs".to_string()),
                    ("Endpoint", self.core.queue_arn(&queue_name)),
                    ("Attributes.entry.1.key", "RawMessageDelivery".to_string()),
                    ("Attributes.entry.1.value", "true".to_string()),
                ],
            )
            .await?;
        let subscription_arn = xml_text(&xml, "SubscriptionArn").unwrap_or_default();

        let core = self.core.clone();
        let poll_queue = queue_name.clone();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let poller = tokio::spawn(async move {
            loop {
                match core.receive_raw(&poll_queue, 10, POLL_WAIT_SECS).await {
                    Ok(messages) => {
                        for mut message in messages {
                            let receipt = message.receipt_handle.take();
                            let handler = handler.clone();
                            let semaphore = semaphore.clone();
                            let core = core.clone();
                            let queue = poll_queue.clone();
                            tokio::spawn(async move {
                                let Ok(_permit) = semaphore.acquire_owned().await else {
                                    return;
                                };
                                match handler.handle(message).await {
                                    Ok(()) => {
                                        if let Some(receipt) = receipt {
                                            if let Err(e) =
                                                core.delete_message(&queue, &receipt).await
                                            {
                                                warn!(error = %e, "failed to settle message");
                                            }
                                        }
                                    }
                                    // Leave the message; visibility expiry
                                    // redelivers it.
                                    Err(e) => warn!(error = %e, "message handler failed"),
                                }
                            });
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, queue = %poll_queue, "subscription poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        self.subscriptions.lock().await.insert(
            subscription_id.clone(),
            SubscriptionTask {
                poller,
                subscription_arn,
                queue_name,
            },
        );
        Ok(subscription_id)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), InfrastructureError> {
        let Some(task) = self.subscriptions.lock().await.remove(subscription_id) else {
            return Ok(());
        };
        task.poller.abort();
        if !task.subscription_arn.is_empty() {
            self.core
                .sns_call(
                    "unsubscribe",
                    subscription_id,
                    vec![
                        ("Action", "Unsubscribe".to_string()),
                        ("Version", SNS_API_VERSION.to_string()),
                        ("SubscriptionArn", task.subscription_arn),
                    ],
                )
                .await?;
        }
        self.core
            .sqs_call(
                &self.core.queue_path(&task.queue_name),
                "unsubscribe",
                &task.queue_name,
                vec![
                    ("Action", "DeleteQueue".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                ],
            )
            .await?;
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
        let message = envelope(queue, payload, priority, metadata);
        let body = encode_envelope(&message, "send_to_queue", queue)?;
        self.core
            .sqs_call(
                &self.core.queue_path(queue),
                "send_to_queue",
                queue,
                vec![
                    ("Action", "SendMessage".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("MessageBody", body),
                    ("DelaySeconds", delay_secs.min(900).to_string()),
                ],
            )
            .await?;
        Ok(message.id)
    }

    async fn receive_from_queue(
        &self,
        queue: &str,
        max_messages: usize,
        wait_secs: u64,
    ) -> Result<Vec<Message>, InfrastructureError> {
        self.core.receive_raw(queue, max_messages, wait_secs).await
    }

    async fn acknowledge_message(&self, message: &Message) -> Result<(), InfrastructureError> {
        let receipt = message.receipt_handle.as_deref().ok_or_else(|| {
            wrap(
                "acknowledge_message",
                format!("message '{}' carries no receipt handle", message.id),
                Some(&message.topic),
                None,
            )
        })?;
        self.core.delete_message(&message.topic, receipt).await
    }

    async fn reject_message(
        &self,
        message: &Message,
        requeue: bool,
    ) -> Result<(), InfrastructureError> {
        let receipt = message.receipt_handle.as_deref().ok_or_else(|| {
            wrap(
                "reject_message",
                format!("message '{}' carries no receipt handle", message.id),
                Some(&message.topic),
                None,
            )
        })?;
        // Either way the message becomes visible immediately; the queue's
        // redrive policy dead-letters it once the receive count is exhausted.
        let _ = requeue;
        self.core
            .sqs_call(
                &self.core.queue_path(&message.topic),
                "reject_message",
                &message.topic,
                vec![
                    ("Action", "ChangeMessageVisibility".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("ReceiptHandle", receipt.to_string()),
                    ("VisibilityTimeout", "0".to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, config), err)]
    async fn create_queue(
        &self,
        name: &str,
        config: &QueueConfig,
    ) -> Result<(), InfrastructureError> {
        let dlq_name = format!("{name}-dlq");
        self.core
            .sqs_call(
                "/",
                "create_queue",
                &dlq_name,
                vec![
                    ("Action", "CreateQueue".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("QueueName", dlq_name.clone()),
                ],
            )
            .await?;
        let redrive = json!({
            "deadLetterTargetArn": self.core.queue_arn(&dlq_name),
            "maxReceiveCount": config.max_receive_count,
        })
        .to_string();
        self.core
            .sqs_call(
                "/",
                "create_queue",
                name,
                vec![
                    ("Action", "CreateQueue".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("QueueName", name.to_string()),
                    ("Attribute.1.Name", "VisibilityTimeout".to_string()),
                    ("Attribute.1.Value", config.visibility_timeout_secs.to_string()),
                    ("Attribute.2.Name", "MessageRetentionPeriod".to_string()),
                    ("Attribute.2.Value", config.message_retention_secs.to_string()),
                    ("Attribute.3.Name", "RedrivePolicy".to_string()),
                    ("Attribute.3.Value", redrive),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), InfrastructureError> {
        self.core
            .sqs_call(
                &self.core.queue_path(name),
                "delete_queue",
                name,
                vec![
                    ("Action", "DeleteQueue".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        let xml = self
            .core
            .sns_call(
                "create_topic",
                name,
                vec![
                    ("Action", "CreateTopic".to_string()),
                    ("Version", SNS_API_VERSION.to_string()),
                    ("Name", name.to_string()),
                ],
            )
            .await?;
        if let Some(arn) = xml_text(&xml, "TopicArn") {
            self.topic_arns.lock().await.insert(name.to_string(), arn);
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<(), InfrastructureError> {
        let arn = self.topic_arn(name).await;
        self.core
            .sns_call(
                "delete_topic",
                name,
                vec![
                    ("Action", "DeleteTopic".to_string()),
                    ("Version", SNS_API_VERSION.to_string()),
                    ("TopicArn", arn),
                ],
            )
            .await?;
        self.topic_arns.lock().await.remove(name);
        Ok(())
    }

    async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, InfrastructureError> {
        let xml = self
            .core
            .sqs_call(
                &self.core.queue_path(queue),
                "get_queue_stats",
                queue,
                vec![
                    ("Action", "GetQueueAttributes".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("AttributeName.1", "ApproximateNumberOfMessages".to_string()),
                    ("AttributeName.2", "ApproximateNumberOfMessagesNotVisible".to_string()),
                ],
            )
            .await?;
        let attributes = parse_attributes(&xml);
        let dead = match self
            .core
            .sqs_call(
                &self.core.queue_path(&format!("{queue}-dlq")),
                "get_queue_stats",
                queue,
                vec![
                    ("Action", "GetQueueAttributes".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                    ("AttributeName.1", "ApproximateNumberOfMessages".to_string()),
                ],
            )
            .await
        {
            Ok(dlq_xml) => attribute_count(&parse_attributes(&dlq_xml), "ApproximateNumberOfMessages"),
            // No DLQ provisioned for this queue.
            Err(_) => 0,
        };
        Ok(QueueStats {
            queue: queue.to_string(),
            visible_messages: attribute_count(&attributes, "ApproximateNumberOfMessages"),
            in_flight_messages: attribute_count(&attributes, "ApproximateNumberOfMessagesNotVisible"),
            dead_lettered_messages: dead,
        })
    }

    async fn health_check(&self) -> bool {
        self.core
            .sqs_call(
                "/",
                "health_check",
                "sqs",
                vec![
                    ("Action", "ListQueues".to_string()),
                    ("Version", SQS_API_VERSION.to_string()),
                ],
            )
            .await
            .is_ok()
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

fn encode_envelope(
    message: &Message,
    operation: &str,
    target: &str,
) -> Result<String, InfrastructureError> {
    serde_json::to_string(message)
        .map_err(|e| wrap(operation, e.to_string(), Some(target), Some(Box::new(e))))
}

#[derive(Debug, Default, PartialEq)]
struct RawSqsMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    receive_count: u32,
}

impl RawSqsMessage {
    fn into_message(self, queue: &str) -> Message {
        let mut message: Message = serde_json::from_str(&self.body).unwrap_or_else(|_| Message {
            id: self.message_id.clone(),
            topic: queue.to_string(),
            payload: serde_json::from_str(&self.body)
                .unwrap_or_else(|_| Value::String(self.body.clone())),
            priority: MessagePriority::Normal,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: 0,
            metadata: BTreeMap::new(),
            receipt_handle: None,
        });
        message.topic = queue.to_string();
        message.retry_count = self.receive_count.saturating_sub(1).max(message.retry_count);
        message.receipt_handle = Some(self.receipt_handle);
        message
    }
}

/// First text content of `tag` anywhere in the document.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => inside = e.local_name().as_ref() == tag.as_bytes(),
            Ok(Event::Text(t)) if inside => {
                return t.unescape().ok().map(|text| text.into_owned());
            }
            Ok(Event::End(_)) => inside = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// All `<Message>` blocks of a ReceiveMessage response.
fn parse_messages(xml: &str) -> Vec<RawSqsMessage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut out = Vec::new();
    let mut current: Option<RawSqsMessage> = None;
    let mut field: Option<String> = None;
    let mut attribute_name: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "Message" {
                    current = Some(RawSqsMessage::default());
                } else {
                    field = Some(tag);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|c| c.into_owned()).unwrap_or_default();
                if let (Some(message), Some(field)) = (current.as_mut(), field.as_deref()) {
                    match field {
                        "MessageId" => message.message_id = text,
                        "ReceiptHandle" => message.receipt_handle = text,
                        "Body" => message.body = text,
                        "Name" => attribute_name = Some(text),
                        "Value" => {
                            if attribute_name.as_deref() == Some("ApproximateReceiveCount") {
                                message.receive_count = text.parse().unwrap_or(1);
                            }
                            attribute_name = None;
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Message" {
                    if let Some(message) = current.take() {
                        out.push(message);
                    }
                } else {
                    field = None;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    out
}

/// `<Attribute><Name>..</Name><Value>..</Value></Attribute>` pairs.
fn parse_attributes(xml: &str) -> BTreeMap<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut out = BTreeMap::new();
    let mut field: Option<String> = None;
    let mut name: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|c| c.into_owned()).unwrap_or_default();
                match field.as_deref() {
                    Some("Name") => name = Some(text),
                    Some("Value") => {
                        if let Some(name) = name.take() {
                            out.insert(name, text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => field = None,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    out
}

fn attribute_count(attributes: &BTreeMap<String, String>, name: &str) -> u64 {
    attributes.get(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn form_body(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{name}={}", percent_encode(value, true)))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
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
    fn parses_receive_message_response() {
        let xml = r#"<?xml version="1.0"?>
        <ReceiveMessageResponse>
          <ReceiveMessageResult>
            <Message>
              <MessageId>m-1</MessageId>
              <ReceiptHandle>rh-abc</ReceiptHandle>
              <Body>{&quot;n&quot;:1}</Body>
              <Attribute><Name>ApproximateReceiveCount</Name><Value>2</Value></Attribute>
            </Message>
            <Message>
              <MessageId>m-2</MessageId>
              <ReceiptHandle>rh-def</ReceiptHandle>
              <Body>plain text</Body>
            </Message>
          </ReceiveMessageResult>
        </ReceiveMessageResponse>"#;
        let messages = parse_messages(xml);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, "m-1");
        assert_eq!(messages[0].receipt_handle, "rh-abc");
        assert_eq!(messages[0].body, r#"{"n":1}"#);
        assert_eq!(messages[0].receive_count, 2);
        assert_eq!(messages[1].receive_count, 0);
    }

    #[test]
    fn raw_message_falls_back_to_plain_payload() {
        let raw = RawSqsMessage {
            message_id: "m-9".into(),
            receipt_handle: "rh".into(),
            body: "not json at all".into(),
            receive_count: 3,
        };
        let message = raw.into_message("jobs");
        assert_eq!(message.id, "m-9");
        assert_eq!(message.topic, "jobs");
        assert_eq!(message.payload, Value::String("not json at all".into()));
        assert_eq!(message.retry_count, 2);
        assert_eq!(message.receipt_handle.as_deref(), Some("rh"));
    }

    #[test]
    fn envelope_round_trips_through_the_body() {
        let mut metadata = BTreeMap::new();
        metadata.insert("tenant".to_string(), "acme".to_string());
        let original = envelope("jobs", json!({"kind": "scan"}), MessagePriority::High, Some(&metadata));
        let raw = RawSqsMessage {
            message_id: "ignored".into(),
            receipt_handle: "rh".into(),
            body: serde_json::to_string(&original).unwrap(),
            receive_count: 1,
        };
        let decoded = raw.into_message("jobs");
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.priority, MessagePriority::High);
        assert_eq!(decoded.metadata["tenant"], "acme");
        assert_eq!(decoded.retry_count, 0);
    }

    #[test]
    fn error_fields_come_from_the_xml() {
        let xml = r#"<ErrorResponse><Error>
            <Code>AWS.SimpleQueueService.NonExistentQueue</Code>
            <Message>The specified queue does not exist.</Message>
        </Error></ErrorResponse>"#;
        assert_eq!(
            xml_text(xml, "Code").as_deref(),
            Some("AWS.SimpleQueueService.NonExistentQueue")
        );
        assert!(xml_text(xml, "Message").unwrap().contains("does not exist"));
        assert_eq!(xml_text(xml, "RequestId"), None);
    }

    #[test]
    fn queue_attributes_parse_into_counts() {
        let xml = r#"<GetQueueAttributesResponse><GetQueueAttributesResult>
            <Attribute><Name>ApproximateNumberOfMessages</Name><Value>4</Value></Attribute>
            <Attribute><Name>ApproximateNumberOfMessagesNotVisible</Name><Value>1</Value></Attribute>
        </GetQueueAttributesResult></GetQueueAttributesResponse>"#;
        let attributes = parse_attributes(xml);
        assert_eq!(attribute_count(&attributes, "ApproximateNumberOfMessages"), 4);
        assert_eq!(attribute_count(&attributes, "ApproximateNumberOfMessagesNotVisible"), 1);
        assert_eq!(attribute_count(&attributes, "Missing"), 0);
    }

    #[test]
    fn form_bodies_are_url_encoded() {
        let body = form_body(&[
            ("Action", "SendMessage".to_string()),
            ("MessageBody", "{\"a\": \"b c\"}".to_string()),
        ]);
        assert_eq!(body, "Action=SendMessage&MessageBody=%7B%22a%22%3A%20%22b%20c%22%7D");
    }

    #[test]
    fn host_extraction_keeps_the_port() {
        assert_eq!(host_of("http://localhost:4566"), "localhost:4566");
        assert_eq!(host_of("https://sqs.us-east-1.amazonaws.com/"), "sqs.us-east-1.amazonaws.com");
    }
}
