//! Delivery envelope and dead-letter record

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Header carrying the number of retries already performed
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
/// Header carrying the routing key a message was published with
pub const ROUTING_KEY_HEADER: &str = "x-routing-key";
/// Header carrying the message id
pub const MESSAGE_ID_HEADER: &str = "x-message-id";
/// Header carrying the first publish timestamp (RFC 3339)
pub const PUBLISHED_AT_HEADER: &str = "x-published-at";
/// Dead-letter annotation: queue the message failed on
pub const ORIGINAL_QUEUE_HEADER: &str = "x-original-queue";
/// Dead-letter annotation: routing key the message was published with
pub const ORIGINAL_ROUTING_HEADER: &str = "x-original-routing";
/// Dead-letter annotation: last handler error
pub const LAST_ERROR_HEADER: &str = "x-last-error";
/// Dead-letter annotation: time the message was dead-lettered (RFC 3339)
pub const FAILED_TIMESTAMP_HEADER: &str = "x-failed-timestamp";

/// A message as handed to a queue consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Message ID (UUIDv7 for ordering), stable across retries
    pub id: Uuid,

    /// Routing key the message was published with
    pub routing_key: String,

    /// Opaque body
    pub body: Bytes,

    /// Retries already performed for this message
    pub retry_count: u32,

    /// Time of the original publish
    pub published_at: DateTime<Utc>,
}

impl Delivery {
    /// Create a fresh delivery for a newly published message
    pub fn new(routing_key: impl Into<String>, body: Bytes) -> Self {
        Self {
            id: Uuid::now_v7(),
            routing_key: routing_key.into(),
            body,
            retry_count: 0,
            published_at: Utc::now(),
        }
    }

    /// Same message, next retry attempt
    pub fn next_attempt(&self, retry_count: u32) -> Self {
        Self {
            retry_count,
            ..self.clone()
        }
    }

    /// Parse a retry counter header value; missing or garbage counts as zero
    pub fn parse_retry_count(value: Option<&str>) -> u32 {
        value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }
}

/// A message moved to the dead-letter channel after exhausting its retries
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Dead-letter entry ID
    pub id: Uuid,

    /// Queue whose consumer gave up
    pub original_queue: String,

    /// Routing key of the failed message
    pub original_routing_key: String,

    /// Retry count at the time of failure
    pub retry_count: u32,

    /// Last handler error
    pub last_error: String,

    /// When the message was dead-lettered
    pub failed_at: DateTime<Utc>,

    /// The failed delivery
    pub delivery: Delivery,
}

impl DeadLetter {
    /// Build a dead-letter record for a delivery that failed on `queue`
    pub fn new(queue: &str, delivery: &Delivery, last_error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            original_queue: queue.to_string(),
            original_routing_key: delivery.routing_key.clone(),
            retry_count: delivery.retry_count,
            last_error: last_error.into(),
            failed_at: Utc::now(),
            delivery: delivery.clone(),
        }
    }

    /// Annotation headers attached when the record leaves the process
    pub fn annotations(&self) -> Vec<(&'static str, String)> {
        vec![
            (ORIGINAL_QUEUE_HEADER, self.original_queue.clone()),
            (ORIGINAL_ROUTING_HEADER, self.original_routing_key.clone()),
            (RETRY_COUNT_HEADER, self.retry_count.to_string()),
            (LAST_ERROR_HEADER, self.last_error.clone()),
            (FAILED_TIMESTAMP_HEADER, self.failed_at.to_rfc3339()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_count_parsing() {
        assert_eq!(Delivery::parse_retry_count(None), 0);
        assert_eq!(Delivery::parse_retry_count(Some("2")), 2);
        assert_eq!(Delivery::parse_retry_count(Some(" 3 ")), 3);
        assert_eq!(Delivery::parse_retry_count(Some("abc")), 0);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let delivery = Delivery::new("check.requested", Bytes::from_static(b"{}"));
        let retried = delivery.next_attempt(2);

        assert_eq!(retried.id, delivery.id);
        assert_eq!(retried.routing_key, "check.requested");
        assert_eq!(retried.retry_count, 2);
        assert_eq!(retried.published_at, delivery.published_at);
    }

    #[test]
    fn test_dead_letter_annotations() {
        let delivery = Delivery::new("check.completed", Bytes::from_static(b"{}")).next_attempt(3);
        let dead = DeadLetter::new("q_report_jobs", &delivery, "render failed");

        let annotations = dead.annotations();
        assert!(annotations.contains(&(ORIGINAL_QUEUE_HEADER, "q_report_jobs".to_string())));
        assert!(annotations.contains(&(ORIGINAL_ROUTING_HEADER, "check.completed".to_string())));
        assert!(annotations.contains(&(RETRY_COUNT_HEADER, "3".to_string())));
        assert!(annotations.contains(&(LAST_ERROR_HEADER, "render failed".to_string())));
        assert!(annotations.iter().any(|(k, _)| *k == FAILED_TIMESTAMP_HEADER));
    }
}
