//! Report worker, the only writer of terminal check state
//!
//! `check.completed`: render, store `<check_id>.pdf`, mark the check
//! completed, announce `report.ready`, fire the completion hook.
//! `check.failed`: mark the check failed.
//!
//! Events for a check that is already terminal are acknowledged untouched,
//! so a replayed event converges on the stored state.

use crate::domain::{Check, CheckCompleted, CheckFailed, Event, EventPayload, ReportReady};
use crate::errors::GatewayError;
use crate::hooks::CompletionHook;
use crate::metrics::{CHECKS_FAILED, CHECKS_PROCESSING, CHECKS_SUCCESS};
use crate::publisher::EventPublisher;
use crate::registry::CheckRegistry;
use crate::storage::BlobStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use compliance_service::{CheckReport, ReportGenerator};
use message_bus::{Delivery, HandlerResult, MessageHandler};
use risk_engine::RiskAssessment;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct ReportWorker {
    registry: Arc<CheckRegistry>,
    blob_store: Arc<dyn BlobStore>,
    generator: ReportGenerator,
    publisher: EventPublisher,
    hook: Arc<dyn CompletionHook>,
    report_ttl: Duration,
}

impl ReportWorker {
    pub fn new(
        registry: Arc<CheckRegistry>,
        blob_store: Arc<dyn BlobStore>,
        generator: ReportGenerator,
        publisher: EventPublisher,
        hook: Arc<dyn CompletionHook>,
        report_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            blob_store,
            generator,
            publisher,
            hook,
            report_ttl,
        }
    }

    async fn process(&self, body: &[u8]) -> Result<(), GatewayError> {
        let event = Event::decode(body)?;
        match event.payload {
            EventPayload::CheckCompleted(completed) => self.complete(completed).await,
            EventPayload::CheckFailed(failed) => self.fail(failed),
            other => {
                warn!(event_type = %other.event_type(), "Unexpected event on reports queue");
                Ok(())
            }
        }
    }

    /// Current record, or `None` when it is already terminal
    fn pending_check(&self, check_id: Uuid) -> Result<Option<Check>, GatewayError> {
        let check = self
            .registry
            .get(&check_id)
            .ok_or_else(|| GatewayError::NotFound(check_id.to_string()))?;

        if check.status.is_terminal() {
            debug!(check_id = %check_id, status = %check.status, "Check already settled, acknowledging");
            return Ok(None);
        }
        Ok(Some(check))
    }

    async fn complete(&self, completed: CheckCompleted) -> Result<(), GatewayError> {
        let Some(mut check) = self.pending_check(completed.check_id)? else {
            return Ok(());
        };
        let now = Utc::now();
        let assessment = RiskAssessment::from_score(completed.risk_score, completed.categories);
        if assessment.risk_level != completed.risk_level {
            warn!(
                check_id = %check.id,
                event_level = %completed.risk_level,
                risk_level = %assessment.risk_level,
                "Event risk level disagrees with score, using derived level"
            );
        }

        let report = CheckReport {
            check_id: check.id.to_string(),
            address: completed.address,
            currency: completed.currency,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            categories: assessment.categories.clone(),
            sanctions: completed.sanctions.clone(),
            generated_at: now,
        };
        let pdf = self.generator.render(&report)?;

        let format = self.generator.format();
        let report_key = format.key_for(&report.check_id);
        self.blob_store
            .put(&report_key, pdf, format.mime_type(), self.report_ttl)
            .await?;

        let risk_level = assessment.risk_level;
        check.mark_completed(assessment, completed.sanctions, report_key.clone(), now)?;
        self.registry.update(check.clone())?;

        CHECKS_SUCCESS.inc();
        CHECKS_PROCESSING.dec();
        info!(
            check_id = %check.id,
            report_key = %report_key,
            risk_level = %risk_level,
            "Check completed"
        );

        let ready = EventPayload::ReportReady(ReportReady {
            check_id: check.id,
            report_key,
        });
        if let Err(e) = self.publisher.publish(ready).await {
            error!(check_id = %check.id, error = %e, "Check completed but report.ready was not published");
        }

        let hook = self.hook.clone();
        tokio::spawn(async move {
            if let Err(e) = hook.on_check_completed(&check).await {
                warn!(check_id = %check.id, error = %e, "Completion hook failed");
            }
        });

        Ok(())
    }

    fn fail(&self, failed: CheckFailed) -> Result<(), GatewayError> {
        let Some(mut check) = self.pending_check(failed.check_id)? else {
            return Ok(());
        };

        check.mark_failed(failed.error_message, Utc::now())?;
        self.registry.update(check.clone())?;

        CHECKS_FAILED.inc();
        CHECKS_PROCESSING.dec();
        info!(
            check_id = %check.id,
            error = check.error_message.as_deref().unwrap_or_default(),
            "Check failed"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ReportWorker {
    async fn handle(&self, delivery: &Delivery) -> HandlerResult {
        self.process(&delivery.body).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CheckStatus, EventType};
    use crate::hooks::{HookResult, NoopCompletionHook};
    use crate::storage::MemoryBlobStore;
    use compliance_service::{validate_pdf, SanctionsResult};
    use message_bus::InMemoryBus;
    use parking_lot::Mutex;
    use risk_engine::{RiskLevel, RiskScore};

    const ADDRESS: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb8";

    struct FailingHook(Mutex<u32>);

    #[async_trait]
    impl CompletionHook for FailingHook {
        async fn on_check_completed(&self, _: &Check) -> HookResult {
            *self.0.lock() += 1;
            Err("webhook unreachable".into())
        }
    }

    struct Harness {
        worker: ReportWorker,
        registry: Arc<CheckRegistry>,
        blobs: Arc<MemoryBlobStore>,
    }

    fn harness(hook: Arc<dyn CompletionHook>) -> Harness {
        let registry = Arc::new(CheckRegistry::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let worker = ReportWorker::new(
            registry.clone(),
            blobs.clone(),
            ReportGenerator::default(),
            EventPublisher::new(Arc::new(InMemoryBus::new())),
            hook,
            Duration::hours(24),
        );
        Harness {
            worker,
            registry,
            blobs,
        }
    }

    impl Harness {
        fn register(&self) -> Uuid {
            let check = Check::new(Uuid::new_v4(), ADDRESS, "ETH", Utc::now(), Duration::hours(1));
            let id = check.id;
            self.registry.create(check).unwrap();
            id
        }
    }

    fn completed(check_id: Uuid, score: u8) -> Delivery {
        completed_with_level(check_id, score, RiskLevel::from(RiskScore::new(score)))
    }

    fn completed_with_level(check_id: Uuid, score: u8, risk_level: RiskLevel) -> Delivery {
        let score = RiskScore::new(score);
        let event = Event::new(EventPayload::CheckCompleted(CheckCompleted {
            check_id,
            address: ADDRESS.to_string(),
            currency: "ETH".to_string(),
            risk_score: score,
            risk_level,
            categories: vec!["Darknet".to_string(), "Mixer".to_string()],
            sanctions: SanctionsResult::clear(),
        }));
        Delivery::new(EventType::CheckCompleted.routing_key(), event.encode().unwrap())
    }

    fn failed(check_id: Uuid, message: &str) -> Delivery {
        let event = Event::new(EventPayload::CheckFailed(CheckFailed {
            check_id,
            error_message: message.to_string(),
        }));
        Delivery::new(EventType::CheckFailed.routing_key(), event.encode().unwrap())
    }

    #[tokio::test]
    async fn test_completed_stores_report_and_settles_check() {
        let h = harness(Arc::new(NoopCompletionHook));
        let id = h.register();

        h.worker.handle(&completed(id, 85)).await.unwrap();

        let check = h.registry.get(&id).unwrap();
        assert_eq!(check.status, CheckStatus::Completed);
        assert_eq!(check.risk_score, Some(RiskScore::new(85)));
        assert_eq!(check.risk_level, Some(RiskLevel::Critical));
        assert_eq!(check.report_key, Some(format!("{}.pdf", id)));

        let blob = h.blobs.get(&format!("{}.pdf", id)).await.unwrap();
        assert_eq!(blob.content_type, "application/pdf");
        validate_pdf(&blob.data).unwrap();
    }

    #[tokio::test]
    async fn test_level_is_derived_from_score() {
        let h = harness(Arc::new(NoopCompletionHook));
        let id = h.register();

        h.worker
            .handle(&completed_with_level(id, 20, RiskLevel::Critical))
            .await
            .unwrap();

        let check = h.registry.get(&id).unwrap();
        assert_eq!(check.risk_score, Some(RiskScore::new(20)));
        assert_eq!(check.risk_level, Some(RiskLevel::Low));
    }

    #[tokio::test]
    async fn test_replayed_completion_converges() {
        let h = harness(Arc::new(NoopCompletionHook));
        let id = h.register();

        h.worker.handle(&completed(id, 85)).await.unwrap();
        let first = h.registry.get(&id).unwrap();

        // a replay with different figures must not change anything
        h.worker.handle(&completed(id, 20)).await.unwrap();
        h.worker.handle(&failed(id, "late failure")).await.unwrap();

        assert_eq!(h.registry.get(&id).unwrap(), first);
        assert_eq!(h.blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_marks_check() {
        let h = harness(Arc::new(NoopCompletionHook));
        let id = h.register();

        h.worker.handle(&failed(id, "provider down")).await.unwrap();

        let check = h.registry.get(&id).unwrap();
        assert_eq!(check.status, CheckStatus::Failed);
        assert_eq!(check.error_message.as_deref(), Some("provider down"));
        assert!(check.report_key.is_none());
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_check_is_an_error() {
        let h = harness(Arc::new(NoopCompletionHook));
        assert!(h.worker.handle(&completed(Uuid::new_v4(), 50)).await.is_err());
        assert!(h.worker.handle(&failed(Uuid::new_v4(), "x")).await.is_err());
        assert!(h.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_undo_completion() {
        let hook = Arc::new(FailingHook(Mutex::new(0)));
        let h = harness(hook.clone());
        let id = h.register();

        h.worker.handle(&completed(id, 40)).await.unwrap();

        for _ in 0..100 {
            if *hook.0.lock() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(*hook.0.lock(), 1);
        assert_eq!(h.registry.get(&id).unwrap().status, CheckStatus::Completed);
    }
}
