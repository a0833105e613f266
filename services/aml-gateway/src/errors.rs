use crate::domain::{AssetError, EventDecodeError, TransitionError};
use crate::registry::RegistryError;
use crate::storage::StorageError;
use crate::token::TokenError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use compliance_service::ComplianceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid {currency} address: {address}")]
    InvalidAddress { currency: String, address: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Check not found: {0}")]
    NotFound(String),

    #[error("Check expired: {0}")]
    Expired(String),

    #[error("AML check failed: {0}")]
    CheckFailed(String),

    #[error("Report link is invalid or expired")]
    ReportLinkInvalid,

    #[error("Transport error: {0}")]
    Transport(#[from] message_bus::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Report error: {0}")]
    Report(#[from] ComplianceError),

    #[error("Event error: {0}")]
    Event(#[from] EventDecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AssetError> for GatewayError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::UnsupportedCurrency(currency) => GatewayError::UnsupportedCurrency(currency),
            AssetError::InvalidAddress { currency, address } => {
                GatewayError::InvalidAddress { currency, address }
            }
        }
    }
}

impl From<TransitionError> for GatewayError {
    fn from(e: TransitionError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<TokenError> for GatewayError {
    fn from(_: TokenError) -> Self {
        GatewayError::ReportLinkInvalid
    }
}

impl GatewayError {
    fn code(&self) -> &'static str {
        match self {
            GatewayError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            GatewayError::InvalidAddress { .. } => "INVALID_ADDRESS",
            GatewayError::InvalidRequest(_) => "VALIDATION_ERROR",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::Expired(_) => "EXPIRED",
            GatewayError::CheckFailed(_) => "CHECK_FAILED",
            GatewayError::ReportLinkInvalid => "REPORT_LINK_INVALID",
            GatewayError::Transport(_) => "TRANSPORT_ERROR",
            GatewayError::Registry(RegistryError::NotFound(_)) => "NOT_FOUND",
            GatewayError::Registry(_) => "CONFLICT",
            GatewayError::Storage(StorageError::NotFound(_)) => "REPORT_NOT_FOUND",
            GatewayError::Storage(StorageError::Expired(_)) => "EXPIRED",
            GatewayError::Storage(_) => "STORAGE_ERROR",
            GatewayError::Report(_) => "REPORT_ERROR",
            GatewayError::Event(_) | GatewayError::Serialization(_) => "SERIALIZATION_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnsupportedCurrency(_)
            | GatewayError::InvalidAddress { .. }
            | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_)
            | GatewayError::Registry(RegistryError::NotFound(_))
            | GatewayError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            GatewayError::Expired(_)
            | GatewayError::ReportLinkInvalid
            | GatewayError::Storage(StorageError::Expired(_)) => StatusCode::GONE,
            GatewayError::CheckFailed(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Registry(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code()
        }))
    }
}
