//! AML address-check gateway
//!
//! Intake, risk and report workers over the event bus, a bounded-wait
//! façade, signed report links and the HTTP surface in front of them.

pub mod cleanup;
pub mod config;
pub mod domain;
pub mod errors;
pub mod facade;
pub mod handlers;
pub mod hooks;
pub mod intake;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod storage;
pub mod token;
pub mod workers;

// Re-exports for convenience
pub use errors::GatewayError;
pub use pipeline::{Capabilities, Pipeline, PipelineSettings};
