//! Retry and dead-letter protocol shared by all brokers
//!
//! A failed delivery is republished with an incremented retry counter
//! and the original acknowledged; once the counter reaches the limit the
//! message goes to the dead-letter channel instead.

use crate::bus::{HandlerResult, MessageHandler};
use crate::message::Delivery;
use crate::metrics::{MESSAGE_PROCESS_DURATION, MESSAGE_RECEIVE_TOTAL};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Retries performed before a message is dead-lettered
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries before dead-lettering
    pub max_retries: u32,

    /// Delay before the first republish; doubles per retry
    pub base_delay: Duration,

    /// Upper bound on the republish delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// What to do with a delivery once its handler returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded
    Ack,

    /// Republish with the given counter, then ack the original
    Retry {
        /// Counter to stamp on the republished copy
        next_retry_count: u32,
        /// Handler error
        error: String,
    },

    /// Publish to the dead-letter channel, then ack the original
    DeadLetter {
        /// Counter at the time of failure
        retry_count: u32,
        /// Handler error
        error: String,
    },
}

impl RetryPolicy {
    /// Retry without waiting
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Decide the fate of a delivery with counter `retry_count`
    pub fn decide(&self, retry_count: u32, outcome: HandlerResult) -> Disposition {
        match outcome {
            Ok(()) => Disposition::Ack,
            Err(e) if retry_count < self.max_retries => Disposition::Retry {
                next_retry_count: retry_count + 1,
                error: e.to_string(),
            },
            Err(e) => Disposition::DeadLetter {
                retry_count,
                error: e.to_string(),
            },
        }
    }

    /// Delay before republishing a delivery that has been retried `retry_count` times
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run a handler, turning a panic into a failure and recording metrics
pub(crate) async fn dispatch(
    handler: &dyn MessageHandler,
    delivery: &Delivery,
    queue: &str,
) -> HandlerResult {
    let start = Instant::now();

    let outcome = match AssertUnwindSafe(handler.handle(delivery)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => Err("handler panicked".into()),
    };

    MESSAGE_PROCESS_DURATION
        .with_label_values(&[queue])
        .observe(start.elapsed().as_secs_f64());
    MESSAGE_RECEIVE_TOTAL
        .with_label_values(&[queue, if outcome.is_ok() { "success" } else { "failure" }])
        .inc();

    outcome
}

/// Sleep for a retry delay, waking early on shutdown
pub(crate) async fn wait_backoff(delay: Duration, shutdown: &CancellationToken) {
    if delay.is_zero() {
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_acked() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, Ok(())), Disposition::Ack);
        assert_eq!(policy.decide(3, Ok(())), Disposition::Ack);
    }

    #[test]
    fn test_failure_below_limit_is_retried() {
        let policy = RetryPolicy::default();
        for count in 0..3 {
            match policy.decide(count, Err("boom".into())) {
                Disposition::Retry { next_retry_count, error } => {
                    assert_eq!(next_retry_count, count + 1);
                    assert_eq!(error, "boom");
                }
                other => panic!("expected retry, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_failure_at_limit_is_dead_lettered() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(3, Err("boom".into())),
            Disposition::DeadLetter {
                retry_count: 3,
                error: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
        assert_eq!(RetryPolicy::immediate().delay_for(2), Duration::ZERO);
    }
}
