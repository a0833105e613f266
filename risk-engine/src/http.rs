//! HTTP risk provider
//!
//! Queries a hosted scoring API:
//! `GET {base_url}/check?address=..&currency=..` with bearer authentication.

use crate::{Error, Result, RiskAssessment, RiskLevel, RiskProvider, RiskScore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP provider configuration
#[derive(Debug, Clone)]
pub struct HttpRiskProviderConfig {
    /// API base URL, without trailing slash
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Request timeout
    pub timeout: Duration,
}

impl HttpRiskProviderConfig {
    /// Configuration with the default 30s timeout
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    risk_score: i64,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    categories: Option<Vec<String>>,
}

/// Hosted risk scoring provider
pub struct HttpRiskProvider {
    client: Client,
    config: HttpRiskProviderConfig,
}

impl HttpRiskProvider {
    /// Create a provider
    pub fn new(config: HttpRiskProviderConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("risk provider base URL is empty".to_string()));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// The level always follows the score; a provider level is only compared
    fn to_assessment(response: CheckResponse) -> RiskAssessment {
        let risk_score = RiskScore::clamped(response.risk_score);
        let derived = RiskLevel::from(risk_score);

        match response.risk_level.as_deref().map(str::parse::<RiskLevel>) {
            Some(Ok(level)) if level != derived => {
                warn!(
                    score = risk_score.score(),
                    provider_level = %level,
                    level = %derived,
                    "Provider risk level disagrees with score, using derived level"
                );
            }
            Some(Err(e)) => warn!("Ignoring provider risk level: {}", e),
            _ => {}
        }

        RiskAssessment::from_score(risk_score, response.categories.unwrap_or_default())
    }
}

#[async_trait]
impl RiskProvider for HttpRiskProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn check_address(&self, address: &str, currency: &str) -> Result<RiskAssessment> {
        let url = format!("{}/check", self.config.base_url.trim_end_matches('/'));
        debug!(url = %url, address, currency, "Requesting risk assessment");

        let response = self
            .client
            .get(&url)
            .query(&[("address", address), ("currency", currency)])
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderStatus {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(Self::to_assessment(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpRiskProvider {
        HttpRiskProvider::new(HttpRiskProviderConfig::new(server.uri(), "secret")).unwrap()
    }

    #[tokio::test]
    async fn test_successful_assessment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .and(query_param("address", "0xabc"))
            .and(query_param("currency", "ETH"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "risk_score": 85,
                "categories": ["Mixer"]
            })))
            .mount(&server)
            .await;

        let assessment = provider(&server).check_address("0xabc", "ETH").await.unwrap();

        assert_eq!(assessment.risk_score.score(), 85);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.categories, vec!["Mixer"]);
    }

    #[tokio::test]
    async fn test_level_follows_clamped_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "risk_score": 140,
                "risk_level": "high"
            })))
            .mount(&server)
            .await;

        let assessment = provider(&server).check_address("0xabc", "ETH").await.unwrap();

        assert_eq!(assessment.risk_score.score(), 100);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(assessment.categories.is_empty());
    }

    #[tokio::test]
    async fn test_provider_level_is_not_trusted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "risk_score": 20,
                "risk_level": "critical"
            })))
            .mount(&server)
            .await;

        let assessment = provider(&server).check_address("0xabc", "ETH").await.unwrap();

        assert_eq!(assessment.risk_score.score(), 20);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(assessment.risk_level, RiskLevel::from(assessment.risk_score));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = provider(&server).check_address("0xabc", "ETH").await.unwrap_err();

        match err {
            Error::ProviderStatus { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server).check_address("0xabc", "ETH").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_rejects_empty_base_url() {
        assert!(HttpRiskProvider::new(HttpRiskProviderConfig::new("", "k")).is_err());
    }
}
