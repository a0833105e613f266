//! In-process broker
//!
//! Queues live as long as the bus and survive consumer restarts. A
//! delivery whose consumer task is dropped mid-handling goes back to the
//! head of its queue, so the next subscriber sees it again.

use crate::bus::{EventBus, MessageHandler, Subscription};
use crate::message::{DeadLetter, Delivery};
use crate::metrics::{DEAD_LETTER_TOTAL, MESSAGE_PUBLISH_TOTAL, MESSAGE_RETRY_TOTAL};
use crate::retry::{dispatch, wait_backoff, Disposition, RetryPolicy};
use crate::routing::{topic_matches, validate_queue_name};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default number of dead letters kept before further ones are dropped
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

/// In-process event bus
#[derive(Clone)]
pub struct InMemoryBus {
    broker: Arc<Broker>,
    policy: RetryPolicy,
}

struct Broker {
    queues: RwLock<HashMap<String, Arc<QueueState>>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    dead_letter_capacity: usize,
}

struct QueueState {
    name: String,
    bindings: RwLock<Vec<String>>,
    pending: Mutex<VecDeque<Delivery>>,
    notify: Notify,
}

impl QueueState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: RwLock::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn is_bound_to(&self, routing_key: &str) -> bool {
        self.bindings
            .read()
            .iter()
            .any(|pattern| topic_matches(pattern, routing_key))
    }

    fn push_back(&self, delivery: Delivery) {
        self.pending.lock().push_back(delivery);
        self.notify.notify_one();
    }

    fn push_front(&self, delivery: Delivery) {
        self.pending.lock().push_front(delivery);
        self.notify.notify_one();
    }

    async fn next_delivery(self: &Arc<Self>) -> Lease {
        loop {
            if let Some(delivery) = self.pending.lock().pop_front() {
                return Lease {
                    queue: self.clone(),
                    delivery: Some(delivery),
                };
            }
            self.notify.notified().await;
        }
    }
}

/// An unacknowledged delivery; dropping it unsettled requeues the message
struct Lease {
    queue: Arc<QueueState>,
    delivery: Option<Delivery>,
}

impl Lease {
    fn delivery(&self) -> Option<&Delivery> {
        self.delivery.as_ref()
    }

    fn settle(mut self) {
        self.delivery = None;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(delivery) = self.delivery.take() {
            warn!(
                queue = %self.queue.name,
                message_id = %delivery.id,
                "Consumer stopped before settling delivery, requeueing"
            );
            self.queue.push_front(delivery);
        }
    }
}

impl Broker {
    fn route(&self, delivery: Delivery) -> usize {
        let queues = self.queues.read();
        let mut routed = 0;

        for queue in queues.values().filter(|q| q.is_bound_to(&delivery.routing_key)) {
            queue.push_back(delivery.clone());
            routed += 1;
        }

        routed
    }

    fn dead_letter(&self, dead: DeadLetter) -> Result<()> {
        let mut store = self.dead_letters.lock();
        if store.len() >= self.dead_letter_capacity {
            return Err(Error::DeadLetterFull(self.dead_letter_capacity));
        }
        store.push(dead);
        Ok(())
    }

    fn declare(&self, subscription: &Subscription) -> Arc<QueueState> {
        let mut queues = self.queues.write();
        let queue = queues
            .entry(subscription.queue.clone())
            .or_insert_with(|| Arc::new(QueueState::new(&subscription.queue)))
            .clone();

        let mut bindings = queue.bindings.write();
        for pattern in &subscription.bindings {
            if !bindings.contains(pattern) {
                bindings.push(pattern.clone());
            }
        }
        drop(bindings);

        queue
    }
}

impl InMemoryBus {
    /// Create a bus with the default retry policy
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Create a bus with a custom retry policy
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::with_capacity(policy, DEFAULT_DEAD_LETTER_CAPACITY)
    }

    /// Create a bus with a custom retry policy and dead-letter capacity
    pub fn with_capacity(policy: RetryPolicy, dead_letter_capacity: usize) -> Self {
        Self {
            broker: Arc::new(Broker {
                queues: RwLock::new(HashMap::new()),
                dead_letters: Mutex::new(Vec::new()),
                dead_letter_capacity,
            }),
            policy,
        }
    }

    /// Snapshot of the dead-letter channel
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.broker.dead_letters.lock().clone()
    }

    /// Number of deliveries waiting on a queue
    pub fn pending(&self, queue: &str) -> usize {
        self.broker
            .queues
            .read()
            .get(queue)
            .map(|q| q.pending.lock().len())
            .unwrap_or(0)
    }

    /// Move a dead letter back onto its original queue with a fresh retry budget
    pub fn replay_dead_letter(&self, id: Uuid) -> Result<()> {
        let dead = {
            let mut store = self.broker.dead_letters.lock();
            let index = store
                .iter()
                .position(|d| d.id == id)
                .ok_or_else(|| Error::DeadLetterNotFound(id.to_string()))?;
            store.remove(index)
        };

        let queue = self.broker.queues.read().get(&dead.original_queue).cloned();
        match queue {
            Some(queue) => {
                info!(
                    queue = %dead.original_queue,
                    routing_key = %dead.original_routing_key,
                    "Replaying dead letter {}", id
                );
                queue.push_back(dead.delivery.next_attempt(0));
                Ok(())
            }
            None => {
                let missing = dead.original_queue.clone();
                self.broker.dead_letters.lock().push(dead);
                Err(Error::DeadLetterNotFound(format!("queue {} no longer exists", missing)))
            }
        }
    }

    async fn consume(
        self,
        queue: Arc<QueueState>,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) {
        info!(queue = %queue.name, "Consumer started");

        loop {
            let lease = tokio::select! {
                _ = shutdown.cancelled() => break,
                lease = queue.next_delivery() => lease,
            };

            self.process(&queue, handler.as_ref(), lease, &shutdown).await;
        }

        info!(queue = %queue.name, "Consumer stopped");
    }

    async fn process(
        &self,
        queue: &Arc<QueueState>,
        handler: &dyn MessageHandler,
        lease: Lease,
        shutdown: &CancellationToken,
    ) {
        let Some(delivery) = lease.delivery().cloned() else {
            return;
        };

        let outcome = dispatch(handler, &delivery, &queue.name).await;

        match self.policy.decide(delivery.retry_count, outcome) {
            Disposition::Ack => {
                debug!(queue = %queue.name, message_id = %delivery.id, "Delivery acknowledged");
            }
            Disposition::Retry {
                next_retry_count,
                error,
            } => {
                warn!(
                    queue = %queue.name,
                    routing_key = %delivery.routing_key,
                    retry_count = next_retry_count,
                    error = %error,
                    "Handler failed, scheduling retry"
                );
                wait_backoff(self.policy.delay_for(delivery.retry_count), shutdown).await;
                queue.push_back(delivery.next_attempt(next_retry_count));
                MESSAGE_RETRY_TOTAL.with_label_values(&[&queue.name]).inc();
            }
            Disposition::DeadLetter { retry_count, error } => {
                let dead = DeadLetter::new(&queue.name, &delivery, error);
                match self.broker.dead_letter(dead) {
                    Ok(()) => {
                        error!(
                            queue = %queue.name,
                            routing_key = %delivery.routing_key,
                            retry_count,
                            "Retries exhausted, message moved to dead-letter channel"
                        );
                        DEAD_LETTER_TOTAL
                            .with_label_values(&[&queue.name, "success"])
                            .inc();
                    }
                    Err(e) => {
                        error!(
                            queue = %queue.name,
                            routing_key = %delivery.routing_key,
                            error = %e,
                            "Dead-letter publish failed, dropping message"
                        );
                        DEAD_LETTER_TOTAL
                            .with_label_values(&[&queue.name, "failure"])
                            .inc();
                    }
                }
            }
        }

        lease.settle();
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, routing_key: &str, body: Bytes) -> Result<()> {
        let routed = self.broker.route(Delivery::new(routing_key, body));

        if routed == 0 {
            debug!(routing_key, "No queue bound, message discarded");
        }
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[routing_key, "success"])
            .inc();

        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        validate_queue_name(&subscription.queue)?;
        let queue = self.broker.declare(&subscription);

        info!(
            queue = %subscription.queue,
            bindings = ?subscription.bindings,
            "Queue declared"
        );

        Ok(tokio::spawn(self.clone().consume(queue, handler, shutdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HandlerResult;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<(String, u32)>>,
        failures_left: AtomicU32,
    }

    impl Recorder {
        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                failures_left: AtomicU32::new(times),
            })
        }

        fn attempts(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, delivery: &Delivery) -> HandlerResult {
            self.seen
                .lock()
                .push((delivery.routing_key.clone(), delivery.retry_count));
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err("transient failure".into());
            }
            Ok(())
        }
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_routes_by_binding() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();
        let requests = Recorder::failing(0);
        let reports = Recorder::failing(0);

        bus.subscribe(
            Subscription::new("q_requests", ["check.requested"]),
            requests.clone(),
            shutdown.clone(),
        )
        .await
        .unwrap();
        bus.subscribe(
            Subscription::new("q_reports", ["check.completed", "check.failed"]),
            reports.clone(),
            shutdown.clone(),
        )
        .await
        .unwrap();

        bus.publish("check.requested", Bytes::from_static(b"a")).await.unwrap();
        bus.publish("check.failed", Bytes::from_static(b"b")).await.unwrap();
        bus.publish("report.ready", Bytes::from_static(b"c")).await.unwrap();
        settle().await;

        assert_eq!(requests.attempts(), 1);
        assert_eq!(reports.attempts(), 1);
        assert_eq!(reports.seen.lock()[0].0, "check.failed");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();
        let handler = Recorder::failing(3);

        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;

        let counts: Vec<u32> = handler.seen.lock().iter().map(|(_, c)| *c).collect();
        assert_eq!(counts, vec![0, 1, 2, 3]);
        assert!(bus.dead_letters().is_empty());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_dead_letters_after_exhausting_retries() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();
        let handler = Recorder::failing(u32::MAX);

        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;

        assert_eq!(handler.attempts(), 4);
        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].original_queue, "q");
        assert_eq!(dead[0].original_routing_key, "job");
        assert_eq!(dead[0].retry_count, 3);
        assert_eq!(dead[0].last_error, "transient failure");
        assert_eq!(bus.pending("q"), 0);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_full_dead_letter_store_drops_message() {
        let bus = InMemoryBus::with_capacity(RetryPolicy::immediate(), 0);
        let shutdown = CancellationToken::new();
        let handler = Recorder::failing(u32::MAX);

        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;

        assert_eq!(handler.attempts(), 4);
        assert!(bus.dead_letters().is_empty());
        assert_eq!(bus.pending("q"), 0);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_replay_dead_letter() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();
        let handler = Recorder::failing(4);

        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        bus.replay_dead_letter(dead[0].id).unwrap();
        settle().await;

        assert_eq!(handler.attempts(), 5);
        assert_eq!(handler.seen.lock()[4].1, 0);
        assert!(bus.dead_letters().is_empty());
        assert!(bus.replay_dead_letter(dead[0].id).is_err());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_queue_survives_consumer_restart() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let first = CancellationToken::new();
        let handler = Recorder::failing(0);

        let task = bus
            .subscribe(Subscription::new("q", ["job"]), handler.clone(), first.clone())
            .await
            .unwrap();
        first.cancel();
        task.await.unwrap();

        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(bus.pending("q"), 1);

        let second = CancellationToken::new();
        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), second.clone())
            .await
            .unwrap();
        settle().await;

        assert_eq!(handler.attempts(), 1);
        assert_eq!(bus.pending("q"), 0);
        second.cancel();
    }

    struct Stalling;

    #[async_trait]
    impl MessageHandler for Stalling {
        async fn handle(&self, _delivery: &Delivery) -> HandlerResult {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_aborted_consumer_requeues_in_flight_delivery() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();

        let task = bus
            .subscribe(Subscription::new("q", ["job"]), Arc::new(Stalling), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;
        assert_eq!(bus.pending("q"), 0);

        task.abort();
        let _ = task.await;
        assert_eq!(bus.pending("q"), 1);

        let handler = Recorder::failing(0);
        bus.subscribe(Subscription::new("q", ["job"]), handler.clone(), shutdown.clone())
            .await
            .unwrap();
        settle().await;
        assert_eq!(handler.attempts(), 1);
        shutdown.cancel();
    }

    struct Panicking;

    #[async_trait]
    impl MessageHandler for Panicking {
        async fn handle(&self, _delivery: &Delivery) -> HandlerResult {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn test_panic_counts_as_failure() {
        let bus = InMemoryBus::with_policy(RetryPolicy::immediate());
        let shutdown = CancellationToken::new();

        bus.subscribe(Subscription::new("q", ["job"]), Arc::new(Panicking), shutdown.clone())
            .await
            .unwrap();
        bus.publish("job", Bytes::from_static(b"x")).await.unwrap();
        settle().await;

        let dead = bus.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error, "handler panicked");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_rejects_invalid_queue_name() {
        let bus = InMemoryBus::new();
        let result = bus
            .subscribe(
                Subscription::new("bad.queue", ["job"]),
                Recorder::failing(0),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
    }
}
