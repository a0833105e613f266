//! Event bus for the AML check pipeline
//!
//! Provides topic-routed, at-least-once messaging with:
//! - Durable queues bound to routing-key patterns
//! - One unacknowledged delivery per consumer (prefetch 1)
//! - Counted retries followed by a dead-letter channel
//! - An in-process broker and a NATS JetStream broker behind one trait
//! - Observability via Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bus;
pub mod error;
pub mod jetstream;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod retry;
pub mod routing;

pub use bus::{EventBus, HandlerError, HandlerResult, MessageHandler, Subscription};
pub use error::{Error, Result};
pub use jetstream::{JetStreamBus, JetStreamConfig};
pub use memory::InMemoryBus;
pub use message::{DeadLetter, Delivery};
pub use retry::{Disposition, RetryPolicy, DEFAULT_MAX_RETRIES};
