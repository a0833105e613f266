//! AML check record and its lifecycle

use chrono::{DateTime, Duration, Utc};
use compliance_service::SanctionsResult;
use risk_engine::{RiskAssessment, RiskLevel, RiskScore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Processing,
    Completed,
    Failed,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Processing => "processing",
            CheckStatus::Completed => "completed",
            CheckStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: CheckStatus,
    pub to: CheckStatus,
}

/// One address screening request and, once known, its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: Uuid,
    pub address: String,
    pub currency: String,
    pub status: CheckStatus,
    pub risk_score: Option<RiskScore>,
    pub risk_level: Option<RiskLevel>,
    pub categories: Vec<String>,
    pub sanctions: SanctionsResult,
    pub report_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Check {
    pub fn new(
        id: Uuid,
        address: impl Into<String>,
        currency: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            currency: currency.into(),
            status: CheckStatus::Processing,
            risk_score: None,
            risk_level: None,
            categories: Vec::new(),
            sanctions: SanctionsResult::clear(),
            report_key: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    /// Processing -> Completed with the assessment and the stored report
    pub fn mark_completed(
        &mut self,
        assessment: RiskAssessment,
        sanctions: SanctionsResult,
        report_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing(CheckStatus::Completed)?;

        self.status = CheckStatus::Completed;
        self.risk_score = Some(assessment.risk_score);
        self.risk_level = Some(assessment.risk_level);
        self.categories = assessment.categories;
        self.sanctions = sanctions;
        self.report_key = Some(report_key.into());
        self.updated_at = now;
        Ok(())
    }

    /// Processing -> Failed with a reason
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing(CheckStatus::Failed)?;

        self.status = CheckStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn ensure_processing(&self, to: CheckStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            Err(TransitionError {
                from: self.status,
                to,
            })
        } else {
            Ok(())
        }
    }
}
