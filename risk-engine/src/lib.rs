//! Risk Engine for the AML gateway
//!
//! Address risk assessment: score and level types, the provider
//! capability, a deterministic offline scorer and an HTTP provider.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod provider;
pub mod scoring;
pub mod types;

pub use error::{Error, Result};
pub use http::{HttpRiskProvider, HttpRiskProviderConfig};
pub use provider::RiskProvider;
pub use scoring::DeterministicRiskScorer;
pub use types::*;
