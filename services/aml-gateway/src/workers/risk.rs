//! Risk-assessment worker
//!
//! Consumes `check.requested`, asks the risk provider and then the
//! sanctions provider, and answers with `check.completed` or
//! `check.failed`. It never writes the registry.

use crate::domain::{CheckCompleted, CheckFailed, CheckRequested, Event, EventPayload};
use crate::errors::GatewayError;
use crate::publisher::EventPublisher;
use crate::registry::CheckRegistry;
use async_trait::async_trait;
use compliance_service::{SanctionsProvider, SanctionsResult};
use message_bus::{Delivery, HandlerResult, MessageHandler};
use risk_engine::RiskProvider;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RiskAssessmentWorker {
    registry: Arc<CheckRegistry>,
    risk: Arc<dyn RiskProvider>,
    sanctions: Arc<dyn SanctionsProvider>,
    publisher: EventPublisher,
}

impl RiskAssessmentWorker {
    pub fn new(
        registry: Arc<CheckRegistry>,
        risk: Arc<dyn RiskProvider>,
        sanctions: Arc<dyn SanctionsProvider>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            registry,
            risk,
            sanctions,
            publisher,
        }
    }

    async fn process(&self, body: &[u8]) -> Result<(), GatewayError> {
        let event = Event::decode(body)?;
        match event.payload {
            EventPayload::CheckRequested(requested) => self.assess(requested).await,
            other => {
                warn!(event_type = %other.event_type(), "Unexpected event on requests queue");
                Ok(())
            }
        }
    }

    async fn assess(&self, requested: CheckRequested) -> Result<(), GatewayError> {
        let check_id = requested.check_id;

        // replays of an already settled (or swept) check are dropped
        match self.registry.get(&check_id) {
            Some(check) if !check.status.is_terminal() => {}
            Some(check) => {
                debug!(check_id = %check_id, status = %check.status, "Check already settled, skipping");
                return Ok(());
            }
            None => {
                debug!(check_id = %check_id, "Check no longer registered, skipping");
                return Ok(());
            }
        }

        let assessment = match self
            .risk
            .check_address(&requested.address, &requested.currency)
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(
                    check_id = %check_id,
                    provider = self.risk.name(),
                    error = %e,
                    "Risk assessment failed"
                );
                self.publisher
                    .publish(EventPayload::CheckFailed(CheckFailed {
                        check_id,
                        error_message: e.to_string(),
                    }))
                    .await?;
                return Ok(());
            }
        };

        let sanctions = match self.sanctions.check_address(&requested.address).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    check_id = %check_id,
                    provider = self.sanctions.name(),
                    error = %e,
                    "Sanctions screening unavailable, continuing without hits"
                );
                SanctionsResult::clear()
            }
        };

        info!(
            check_id = %check_id,
            risk_score = assessment.risk_score.score(),
            risk_level = %assessment.risk_level,
            sanctions_hit = sanctions.hit,
            "Risk assessment done"
        );

        self.publisher
            .publish(EventPayload::CheckCompleted(CheckCompleted {
                check_id,
                address: requested.address,
                currency: requested.currency,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                categories: assessment.categories,
                sanctions,
            }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for RiskAssessmentWorker {
    async fn handle(&self, delivery: &Delivery) -> HandlerResult {
        self.process(&delivery.body).await.map_err(Into::into)
    }
}
