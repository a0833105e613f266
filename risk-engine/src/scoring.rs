//! Deterministic risk scoring
//!
//! Offline stand-in for a hosted provider: the same address always gets
//! the same score, which keeps local runs and tests reproducible.

use crate::{RiskAssessment, RiskProvider, RiskScore, Result};
use async_trait::async_trait;
use tracing::debug;

/// Deterministic risk scorer
#[derive(Debug, Clone, Default)]
pub struct DeterministicRiskScorer;

impl DeterministicRiskScorer {
    /// Create new scorer
    pub fn new() -> Self {
        Self
    }

    /// Score an address without I/O
    pub fn assess(&self, address: &str) -> RiskAssessment {
        let score = RiskScore::new((10 + address.len() % 80) as u8);

        let mut categories = Vec::new();
        if score.score() >= 60 {
            categories.push("High Risk Exchange".to_string());
        }
        if score.score() >= 80 {
            categories.push("Darknet".to_string());
            categories.push("Mixer".to_string());
        }

        RiskAssessment::from_score(score, categories)
    }
}

#[async_trait]
impl RiskProvider for DeterministicRiskScorer {
    fn name(&self) -> &str {
        "deterministic"
    }

    async fn check_address(&self, address: &str, currency: &str) -> Result<RiskAssessment> {
        let assessment = self.assess(address);
        debug!(
            address,
            currency,
            score = assessment.risk_score.score(),
            "Deterministic risk assessment"
        );
        Ok(assessment)
    }
}
