//! Broker-independent bus interface

use crate::message::Delivery;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Error returned by a message handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of handling one delivery
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery; an error triggers the retry protocol
    async fn handle(&self, delivery: &Delivery) -> HandlerResult;
}

/// A durable queue and the routing-key patterns bound to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Queue name
    pub queue: String,

    /// Binding patterns (`*` one word, `#` zero or more words)
    pub bindings: Vec<String>,
}

impl Subscription {
    /// Create a subscription
    pub fn new<I, S>(queue: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: queue.into(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }
}

/// Topic-routed, durable, at-least-once event bus
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a body under a routing key; returns once the broker has accepted it
    async fn publish(&self, routing_key: &str, body: Bytes) -> Result<()>;

    /// Declare the queue and its bindings, then consume it one delivery at a time
    ///
    /// Messages published after this returns are routed to the queue. The
    /// consumer stops taking new deliveries once `shutdown` is cancelled; a
    /// delivery already being handled runs to completion.
    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>>;
}
