//! NATS JetStream broker
//!
//! Provides durable queues with:
//! - One interest-retention stream holding every routed event
//! - One durable pull consumer per queue, at most one unacknowledged message
//! - Retry copies addressed to the failing queue only
//! - A limits-retention stream as the dead-letter channel
//! - In-progress acks while a message is being handled or backing off

use crate::bus::{EventBus, MessageHandler, Subscription};
use crate::message::{
    DeadLetter, Delivery, MESSAGE_ID_HEADER, PUBLISHED_AT_HEADER, RETRY_COUNT_HEADER,
    ROUTING_KEY_HEADER,
};
use crate::metrics::{DEAD_LETTER_TOTAL, MESSAGE_PUBLISH_TOTAL, MESSAGE_RETRY_TOTAL};
use crate::retry::{dispatch, wait_backoff, Disposition, RetryPolicy};
use crate::routing::{nats_filter, validate_queue_name};
use crate::{Error, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, Context as JetStreamContext,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// JetStream broker configuration
#[derive(Debug, Clone)]
pub struct JetStreamConfig {
    /// NATS server URL
    pub url: String,

    /// Event stream name
    pub stream_name: String,

    /// Subject prefix for routed events
    pub subject_prefix: String,

    /// Subject prefix for per-queue retry copies
    pub retry_prefix: String,

    /// Dead-letter stream name
    pub dlq_stream_name: String,

    /// Subject prefix for dead letters
    pub dlq_prefix: String,

    /// Redelivery timeout for an unacknowledged message
    pub ack_wait: Duration,

    /// Maximum age of an event in the stream
    pub max_age: Duration,

    /// Server-side redelivery cap per message
    pub max_deliver: i64,
}

impl Default for JetStreamConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "AML_EVENTS".to_string(),
            subject_prefix: "aml.events".to_string(),
            retry_prefix: "aml.retry".to_string(),
            dlq_stream_name: "AML_DLQ".to_string(),
            dlq_prefix: "aml.dlq".to_string(),
            ack_wait: Duration::from_secs(60),
            max_age: Duration::from_secs(7 * 24 * 3600), // 7 days
            max_deliver: 10,
        }
    }
}

/// JetStream-backed event bus
#[derive(Clone)]
pub struct JetStreamBus {
    context: JetStreamContext,
    config: Arc<JetStreamConfig>,
    policy: RetryPolicy,
}

impl JetStreamBus {
    /// Connect and make sure the event and dead-letter streams exist
    pub async fn connect(config: JetStreamConfig, policy: RetryPolicy) -> Result<Self> {
        info!("Connecting to NATS JetStream at {}", config.url);

        let client = async_nats::connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let bus = Self {
            context: jetstream::new(client),
            config: Arc::new(config),
            policy,
        };
        bus.init_streams().await?;

        Ok(bus)
    }

    async fn init_streams(&self) -> Result<()> {
        let events = StreamConfig {
            name: self.config.stream_name.clone(),
            description: Some("AML pipeline events".to_string()),
            subjects: vec![
                format!("{}.>", self.config.subject_prefix),
                format!("{}.>", self.config.retry_prefix),
            ],
            retention: RetentionPolicy::Interest,
            max_age: self.config.max_age,
            storage: StorageType::File,
            ..Default::default()
        };
        self.ensure_stream(events).await?;

        let dead_letters = StreamConfig {
            name: self.config.dlq_stream_name.clone(),
            description: Some("Dead letters for manual inspection".to_string()),
            subjects: vec![format!("{}.>", self.config.dlq_prefix)],
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(30 * 24 * 3600), // 30 days
            storage: StorageType::File,
            ..Default::default()
        };
        self.ensure_stream(dead_letters).await?;

        info!("JetStream streams initialized successfully");
        Ok(())
    }

    async fn ensure_stream(&self, config: StreamConfig) -> Result<()> {
        let name = config.name.clone();
        match self.context.get_or_create_stream(config).await {
            Ok(_) => {
                info!("Stream {} ready", name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to create stream {}: {}", name, e);
                Err(Error::StreamSetup(e.to_string()))
            }
        }
    }

    fn retry_subject(&self, queue: &str, routing_key: &str) -> String {
        format!("{}.{}.{}", self.config.retry_prefix, queue, routing_key)
    }

    async fn publish_raw(&self, subject: String, headers: HeaderMap, body: Bytes) -> Result<()> {
        self.context
            .publish_with_headers(subject, headers, body)
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;
        Ok(())
    }

    fn delivery_headers(delivery: &Delivery) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_ID_HEADER, delivery.id.to_string().as_str());
        headers.insert(ROUTING_KEY_HEADER, delivery.routing_key.as_str());
        headers.insert(RETRY_COUNT_HEADER, delivery.retry_count.to_string().as_str());
        headers.insert(PUBLISHED_AT_HEADER, delivery.published_at.to_rfc3339().as_str());
        headers
    }

    /// Drive `work` to completion, telling the server the message is still in progress
    async fn in_progress<F: Future>(&self, message: &jetstream::Message, work: F) -> F::Output {
        let period = progress_interval(self.config.ack_wait);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(work);

        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = ticker.tick() => {
                    if let Err(e) = message.ack_with(AckKind::Progress).await {
                        debug!(error = %e, "Failed to send in-progress ack");
                    }
                }
            }
        }
    }

    async fn create_consumer(&self, subscription: &Subscription) -> Result<PullConsumer> {
        let mut filter_subjects = subscription
            .bindings
            .iter()
            .map(|pattern| nats_filter(&self.config.subject_prefix, pattern))
            .collect::<Result<Vec<_>>>()?;
        filter_subjects.push(format!("{}.{}.>", self.config.retry_prefix, subscription.queue));

        let consumer_config = pull::Config {
            durable_name: Some(subscription.queue.clone()),
            description: Some(format!("Queue {}", subscription.queue)),
            filter_subjects,
            ack_policy: AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            max_ack_pending: 1,
            max_deliver: self.config.max_deliver,
            deliver_policy: DeliverPolicy::All,
            ..Default::default()
        };

        let consumer: PullConsumer = self
            .context
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| Error::StreamSetup(e.to_string()))?
            .create_consumer(consumer_config)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!("Consumer {} created successfully", subscription.queue);
        Ok(consumer)
    }

    async fn consume(
        self,
        queue: String,
        consumer: PullConsumer,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) {
        let mut messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(queue = %queue, error = %e, "Failed to open message stream");
                return;
            }
        };

        info!(queue = %queue, "Consumer started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = messages.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    self.process(&queue, handler.as_ref(), message, &shutdown).await
                }
                Some(Err(e)) => warn!(queue = %queue, error = %e, "Error receiving message"),
                None => {
                    warn!(queue = %queue, "Message stream closed");
                    break;
                }
            }
        }

        info!(queue = %queue, "Consumer stopped");
    }

    async fn process(
        &self,
        queue: &str,
        handler: &dyn MessageHandler,
        message: jetstream::Message,
        shutdown: &CancellationToken,
    ) {
        let delivery = delivery_from(
            &self.config.subject_prefix,
            &message.subject,
            message.headers.as_ref(),
            message.payload.clone(),
        );
        let outcome = self
            .in_progress(&message, dispatch(handler, &delivery, queue))
            .await;

        let settled = match self.policy.decide(delivery.retry_count, outcome) {
            Disposition::Ack => message.ack().await,
            Disposition::Retry {
                next_retry_count,
                error,
            } => {
                warn!(
                    queue,
                    routing_key = %delivery.routing_key,
                    retry_count = next_retry_count,
                    error = %error,
                    "Handler failed, scheduling retry"
                );
                self.in_progress(
                    &message,
                    wait_backoff(self.policy.delay_for(delivery.retry_count), shutdown),
                )
                .await;

                let retry = delivery.next_attempt(next_retry_count);
                let subject = self.retry_subject(queue, &retry.routing_key);
                match self
                    .publish_raw(subject, Self::delivery_headers(&retry), retry.body.clone())
                    .await
                {
                    Ok(()) => {
                        MESSAGE_RETRY_TOTAL.with_label_values(&[queue]).inc();
                        message.ack().await
                    }
                    Err(e) => {
                        error!(
                            queue,
                            error = %e,
                            max_deliver = self.config.max_deliver,
                            "Retry publish failed, requesting redelivery"
                        );
                        message.ack_with(AckKind::Nak(None)).await
                    }
                }
            }
            Disposition::DeadLetter { retry_count, error } => {
                let dead = DeadLetter::new(queue, &delivery, error);
                let mut headers = Self::delivery_headers(&delivery);
                for (name, value) in dead.annotations() {
                    headers.insert(name, value.as_str());
                }

                let subject = format!("{}.{}", self.config.dlq_prefix, queue);
                match self.publish_raw(subject, headers, delivery.body.clone()).await {
                    Ok(()) => {
                        error!(
                            queue,
                            routing_key = %delivery.routing_key,
                            retry_count,
                            "Retries exhausted, message moved to dead-letter stream"
                        );
                        DEAD_LETTER_TOTAL.with_label_values(&[queue, "success"]).inc();
                        message.ack().await
                    }
                    Err(e) => {
                        error!(
                            queue,
                            routing_key = %delivery.routing_key,
                            error = %e,
                            "Dead-letter publish failed, rejecting message"
                        );
                        DEAD_LETTER_TOTAL.with_label_values(&[queue, "failure"]).inc();
                        message.ack_with(AckKind::Term).await
                    }
                }
            }
        };

        if let Err(e) = settled {
            warn!(queue, message_id = %delivery.id, error = %e, "Failed to settle message");
        } else {
            debug!(queue, message_id = %delivery.id, "Message settled");
        }
    }
}

/// Rebuild a delivery from message headers; missing headers fall back to
/// the subject, a fresh id and the current time
fn delivery_from(
    subject_prefix: &str,
    subject: &str,
    headers: Option<&HeaderMap>,
    payload: Bytes,
) -> Delivery {
    let header = |name: &str| {
        headers
            .and_then(|h| h.get(name))
            .map(|v| v.as_str().to_string())
    };

    let routing_key = header(ROUTING_KEY_HEADER).unwrap_or_else(|| {
        subject
            .strip_prefix(subject_prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(subject)
            .to_string()
    });

    Delivery {
        id: header(MESSAGE_ID_HEADER)
            .and_then(|v| Uuid::parse_str(&v).ok())
            .unwrap_or_else(Uuid::now_v7),
        routing_key,
        body: payload,
        retry_count: Delivery::parse_retry_count(header(RETRY_COUNT_HEADER).as_deref()),
        published_at: header(PUBLISHED_AT_HEADER)
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    }
}

/// Half the ack wait, never below one second
fn progress_interval(ack_wait: Duration) -> Duration {
    (ack_wait / 2).max(Duration::from_secs(1))
}

#[async_trait]
impl EventBus for JetStreamBus {
    async fn publish(&self, routing_key: &str, body: Bytes) -> Result<()> {
        let delivery = Delivery::new(routing_key, body);
        let subject = nats_filter(&self.config.subject_prefix, routing_key)?;

        let result = self
            .publish_raw(subject, Self::delivery_headers(&delivery), delivery.body.clone())
            .await;

        let status = if result.is_ok() { "success" } else { "failure" };
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[routing_key, status])
            .inc();

        result
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        validate_queue_name(&subscription.queue)?;
        let consumer = self.create_consumer(&subscription).await?;

        Ok(tokio::spawn(self.clone().consume(
            subscription.queue,
            consumer,
            handler,
            shutdown,
        )))
    }
}
