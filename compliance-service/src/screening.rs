//! Hosted address screening
//!
//! `GET {base_url}/address/{address}` with an `X-API-Key` header. A 404
//! means the address is not listed.

use crate::error::{ComplianceError, Result};
use crate::sanctions::SanctionsProvider;
use crate::types::{SanctionsIdentification, SanctionsResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SCREENING_URL: &str = "https://public.chainalysis.com/api/v1";

#[derive(Debug, Clone)]
pub struct HttpSanctionsProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl HttpSanctionsProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_SCREENING_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ScreeningResponse {
    #[serde(default)]
    identifications: Vec<SanctionsIdentification>,
}

pub struct HttpSanctionsProvider {
    client: Client,
    config: HttpSanctionsProviderConfig,
}

impl HttpSanctionsProvider {
    pub fn new(config: HttpSanctionsProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SanctionsProvider for HttpSanctionsProvider {
    fn name(&self) -> &str {
        "http-screening"
    }

    async fn check_address(&self, address: &str) -> Result<SanctionsResult> {
        if self.config.api_key.is_empty() {
            warn!("Screening API key not configured, returning empty sanctions result");
            return Ok(SanctionsResult::clear());
        }

        let url = format!(
            "{}/address/{}",
            self.config.base_url.trim_end_matches('/'),
            address
        );
        debug!(url = %url, "Requesting sanctions screening");

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.config.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(SanctionsResult::clear()),
            StatusCode::OK => {
                let body: ScreeningResponse = response
                    .json()
                    .await
                    .map_err(|e| ComplianceError::InvalidResponse(e.to_string()))?;
                Ok(SanctionsResult::from_identifications(body.identifications))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ComplianceError::ProviderStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
