use compliance_service::SanctionsIdentification;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const PROCESSING_MESSAGE: &str = "Check is being processed. Use the poll_url to check status.";

// ===== Check Request =====
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CheckAddressRequest {
    #[validate(length(min = 1, max = 128))]
    pub address: String,
    #[validate(length(min = 1, max = 10))]
    pub currency: String,
}

// ===== Check Responses =====
#[derive(Debug, Serialize, Deserialize)]
pub struct SanctionsResponse {
    pub hit: bool,
    pub identifications: Vec<SanctionsIdentification>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckSuccessResponse {
    pub status: String,
    pub risk_score: u8,
    pub risk_level: String,
    pub categories: Vec<String>,
    pub sanctions: SanctionsResponse,
    pub pdf_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckProcessingResponse {
    pub status: String,
    pub message: String,
    pub poll_url: String,
}

impl CheckProcessingResponse {
    pub fn new(poll_url: String) -> Self {
        Self {
            status: "processing".to_string(),
            message: PROCESSING_MESSAGE.to_string(),
            poll_url,
        }
    }
}

// ===== Health =====
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
