//! Bus consumers of the check pipeline

pub mod report;
pub mod risk;

pub use report::ReportWorker;
pub use risk::RiskAssessmentWorker;

use crate::domain::EventType;
use message_bus::Subscription;

pub const REQUESTS_QUEUE: &str = "q_aml_requests";
pub const REPORTS_QUEUE: &str = "q_report_jobs";

pub fn requests_subscription() -> Subscription {
    Subscription::new(REQUESTS_QUEUE, [EventType::CheckRequested.routing_key()])
}

pub fn reports_subscription() -> Subscription {
    Subscription::new(
        REPORTS_QUEUE,
        [
            EventType::CheckCompleted.routing_key(),
            EventType::CheckFailed.routing_key(),
        ],
    )
}
