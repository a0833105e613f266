//! Prometheus metrics for message bus

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    /// Total messages published
    pub static ref MESSAGE_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_publish_total",
        "Total messages published",
        &["routing_key", "status"]
    )
    .unwrap();

    /// Total deliveries handled
    pub static ref MESSAGE_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_receive_total",
        "Total deliveries handled",
        &["queue", "status"]
    )
    .unwrap();

    /// Handler duration
    pub static ref MESSAGE_PROCESS_DURATION: HistogramVec = register_histogram_vec!(
        "message_bus_process_duration_seconds",
        "Message processing duration in seconds",
        &["queue"]
    )
    .unwrap();

    /// Retries scheduled
    pub static ref MESSAGE_RETRY_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_retry_total",
        "Total deliveries republished for retry",
        &["queue"]
    )
    .unwrap();

    /// Dead-letter publishes
    pub static ref DEAD_LETTER_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_dead_letter_total",
        "Total messages moved to the dead-letter channel",
        &["queue", "status"]
    )
    .unwrap();
}
