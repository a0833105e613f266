//! Intake: validate, register, announce

use crate::domain::{AssetRegistry, Check, CheckRequested, EventPayload};
use crate::errors::GatewayError;
use crate::metrics::{CHECKS_PROCESSING, CHECKS_TOTAL};
use crate::publisher::EventPublisher;
use crate::registry::CheckRegistry;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub struct IntakeService {
    assets: AssetRegistry,
    registry: Arc<CheckRegistry>,
    publisher: EventPublisher,
    check_ttl: Duration,
}

impl IntakeService {
    pub fn new(
        assets: AssetRegistry,
        registry: Arc<CheckRegistry>,
        publisher: EventPublisher,
        check_ttl: Duration,
    ) -> Self {
        Self {
            assets,
            registry,
            publisher,
            check_ttl,
        }
    }

    /// Create a `Processing` check and publish `check.requested`
    ///
    /// Nothing is created when the currency or address is rejected. A publish
    /// failure is returned to the caller; the record then stays `Processing`
    /// (and in the processing gauge) until the expiry sweep removes it.
    pub async fn submit(&self, address: &str, currency: &str) -> Result<Check, GatewayError> {
        let asset = self.assets.get(currency)?;
        let address = asset.normalize(address);
        asset.validate(&address)?;

        let check = Check::new(
            Uuid::new_v4(),
            address,
            asset.symbol(),
            Utc::now(),
            self.check_ttl,
        );
        self.registry.create(check.clone())?;

        CHECKS_TOTAL.inc();
        CHECKS_PROCESSING.inc();

        let requested = EventPayload::CheckRequested(CheckRequested {
            check_id: check.id,
            address: check.address.clone(),
            currency: check.currency.clone(),
        });
        if let Err(e) = self.publisher.publish(requested).await {
            error!(
                check_id = %check.id,
                error = %e,
                "Check registered but check.requested was not published; record is orphaned until expiry"
            );
            return Err(e);
        }

        info!(
            check_id = %check.id,
            currency = %check.currency,
            chain = asset.chain(),
            "AML check accepted"
        );
        Ok(check)
    }
}
