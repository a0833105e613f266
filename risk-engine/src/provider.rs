//! Risk provider capability

use crate::{Result, RiskAssessment};
use async_trait::async_trait;

/// Scores a blockchain address
#[async_trait]
pub trait RiskProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Assess an already-normalized address on the given currency
    async fn check_address(&self, address: &str, currency: &str) -> Result<RiskAssessment>;
}
