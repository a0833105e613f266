use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ComplianceError {
    #[error("Screening provider returned status {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("Screening request failed: {0}")]
    Http(String),

    #[error("Invalid screening response: {0}")]
    InvalidResponse(String),

    #[error("Invalid screening input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Report generation failed: {0}")]
    ReportGeneration(String),

    #[error("Invalid report: {0}")]
    InvalidReport(String),
}

impl From<reqwest::Error> for ComplianceError {
    fn from(e: reqwest::Error) -> Self {
        ComplianceError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
