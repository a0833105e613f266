//! Synchronous façade over the asynchronous pipeline
//!
//! Reads the registry only. `await_outcome` polls on a fixed interval until
//! the check is terminal or the wait runs out; `status` answers at once.

use crate::domain::{Check, CheckStatus};
use crate::errors::GatewayError;
use crate::registry::CheckRegistry;
use crate::storage::{Blob, BlobStore};
use crate::token::ReportTokenSigner;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

/// Lifetime of a presigned redirect
pub const PRESIGN_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Completed { check: Check, report_url: String },
    Failed { check: Check },
    Processing { check_id: Uuid, poll_url: String },
}

impl CheckOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckOutcome::Processing { .. })
    }
}

#[derive(Debug)]
pub enum ReportDownload {
    Redirect(String),
    Inline(Blob),
}

#[derive(Debug, Clone)]
pub struct FacadeSettings {
    /// Public base URL used in poll and report links
    pub external_url: String,
    pub wait: Duration,
    pub poll_interval: Duration,
    pub report_link_ttl: chrono::Duration,
}

pub struct CheckFacade {
    registry: Arc<CheckRegistry>,
    blob_store: Arc<dyn BlobStore>,
    signer: ReportTokenSigner,
    settings: FacadeSettings,
}

impl CheckFacade {
    pub fn new(
        registry: Arc<CheckRegistry>,
        blob_store: Arc<dyn BlobStore>,
        signer: ReportTokenSigner,
        mut settings: FacadeSettings,
    ) -> Self {
        settings.external_url = settings.external_url.trim_end_matches('/').to_string();
        Self {
            registry,
            blob_store,
            signer,
            settings,
        }
    }

    pub fn poll_url(&self, check_id: Uuid) -> String {
        format!("{}/v1/check-address/{}", self.settings.external_url, check_id)
    }

    /// Current outcome without waiting
    pub fn status(&self, check_id: Uuid) -> Result<CheckOutcome, GatewayError> {
        let check = self
            .registry
            .get(&check_id)
            .ok_or_else(|| GatewayError::NotFound(check_id.to_string()))?;

        let now = Utc::now();
        if check.is_expired(now) {
            return Err(GatewayError::Expired(check_id.to_string()));
        }

        match check.status {
            CheckStatus::Processing => Ok(CheckOutcome::Processing {
                check_id,
                poll_url: self.poll_url(check_id),
            }),
            CheckStatus::Completed => {
                let key = check.report_key.as_deref().ok_or_else(|| {
                    GatewayError::Internal(format!("completed check {} has no report", check_id))
                })?;
                let token = self.signer.sign(key, now + self.settings.report_link_ttl);
                let report_url = format!("{}/v1/report/{}", self.settings.external_url, token);
                Ok(CheckOutcome::Completed { check, report_url })
            }
            CheckStatus::Failed => Ok(CheckOutcome::Failed { check }),
        }
    }

    /// Poll until the check is terminal or the configured wait elapses
    pub async fn await_outcome(&self, check_id: Uuid) -> Result<CheckOutcome, GatewayError> {
        let deadline = Instant::now() + self.settings.wait;
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = self.status(check_id)?;
            if outcome.is_terminal() {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                debug!(check_id = %check_id, "Wait elapsed, handing out poll handle");
                return Ok(outcome);
            }
        }
    }

    /// Resolve a signed report link into a redirect or the report bytes
    pub async fn open_report(&self, token: &str) -> Result<ReportDownload, GatewayError> {
        let key = self.signer.verify(token, Utc::now())?;

        let url = self
            .blob_store
            .presign(&key, chrono::Duration::minutes(PRESIGN_TTL_MINUTES))
            .await?;
        if !url.is_empty() {
            return Ok(ReportDownload::Redirect(url));
        }

        Ok(ReportDownload::Inline(self.blob_store.get(&key).await?))
    }
}
