pub mod error;
pub mod report_generator;
pub mod sanctions;
pub mod screening;
pub mod types;

pub use error::ComplianceError;
pub use report_generator::{validate_pdf, CheckReport, ReportConfig, ReportFormat, ReportGenerator};
pub use sanctions::{SanctionsEngine, SanctionsProvider};
pub use screening::{HttpSanctionsProvider, HttpSanctionsProviderConfig};
pub use types::{SanctionsEntry, SanctionsIdentification, SanctionsList, SanctionsResult};
