//! Wiring of the check pipeline
//!
//! One registry and one publisher shared by intake, both workers and the
//! façade; two bus subscriptions and two sweepers, all stopped by the same
//! cancellation token.

use crate::cleanup::{spawn_blob_sweeper, spawn_registry_sweeper};
use crate::config::Config;
use crate::domain::{Asset, AssetRegistry};
use crate::errors::GatewayError;
use crate::facade::{CheckFacade, FacadeSettings};
use crate::handlers::AppState;
use crate::hooks::CompletionHook;
use crate::intake::IntakeService;
use crate::publisher::EventPublisher;
use crate::registry::CheckRegistry;
use crate::storage::BlobStore;
use crate::token::ReportTokenSigner;
use crate::workers::{self, ReportWorker, RiskAssessmentWorker};
use compliance_service::{ReportGenerator, SanctionsProvider};
use message_bus::EventBus;
use parking_lot::Mutex;
use risk_engine::RiskProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// External collaborators the pipeline is built from
#[derive(Clone)]
pub struct Capabilities {
    pub bus: Arc<dyn EventBus>,
    pub risk: Arc<dyn RiskProvider>,
    pub sanctions: Arc<dyn SanctionsProvider>,
    pub blob_store: Arc<dyn BlobStore>,
    pub hook: Arc<dyn CompletionHook>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub token_secret: String,
    pub external_url: String,
    pub check_wait: Duration,
    pub poll_interval: Duration,
    pub check_ttl: chrono::Duration,
    pub report_ttl: chrono::Duration,
    pub report_link_ttl: chrono::Duration,
    pub cleanup_interval: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            token_secret: config.security.token_secret.clone(),
            external_url: config.server.external_url.clone(),
            check_wait: config.pipeline.check_wait(),
            poll_interval: config.pipeline.poll_interval(),
            check_ttl: config.pipeline.check_ttl(),
            report_ttl: config.pipeline.report_ttl(),
            report_link_ttl: config.pipeline.report_link_ttl(),
            cleanup_interval: config.pipeline.cleanup_interval(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            token_secret: crate::config::DEFAULT_TOKEN_SECRET.to_string(),
            external_url: "http://localhost:8080".to_string(),
            check_wait: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            check_ttl: chrono::Duration::hours(24),
            report_ttl: chrono::Duration::hours(24),
            report_link_ttl: chrono::Duration::hours(24),
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

pub struct Pipeline {
    registry: Arc<CheckRegistry>,
    state: AppState,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Subscribe both workers and start the sweepers
    pub async fn start(
        capabilities: Capabilities,
        settings: PipelineSettings,
    ) -> Result<Self, GatewayError> {
        let registry = Arc::new(CheckRegistry::new());
        let publisher = EventPublisher::new(capabilities.bus.clone());
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::with_capacity(4);

        let risk_worker = RiskAssessmentWorker::new(
            registry.clone(),
            capabilities.risk.clone(),
            capabilities.sanctions.clone(),
            publisher.clone(),
        );
        tasks.push(
            capabilities
                .bus
                .subscribe(
                    workers::requests_subscription(),
                    Arc::new(risk_worker),
                    shutdown.child_token(),
                )
                .await?,
        );

        let report_worker = ReportWorker::new(
            registry.clone(),
            capabilities.blob_store.clone(),
            ReportGenerator::default(),
            publisher.clone(),
            capabilities.hook.clone(),
            settings.report_ttl,
        );
        tasks.push(
            capabilities
                .bus
                .subscribe(
                    workers::reports_subscription(),
                    Arc::new(report_worker),
                    shutdown.child_token(),
                )
                .await?,
        );

        tasks.push(spawn_registry_sweeper(
            registry.clone(),
            settings.cleanup_interval,
            shutdown.child_token(),
        ));
        tasks.push(spawn_blob_sweeper(
            capabilities.blob_store.clone(),
            settings.cleanup_interval,
            shutdown.child_token(),
        ));

        let intake = IntakeService::new(
            AssetRegistry::with_assets(Asset::ALL),
            registry.clone(),
            publisher,
            settings.check_ttl,
        );
        let facade = CheckFacade::new(
            registry.clone(),
            capabilities.blob_store.clone(),
            ReportTokenSigner::new(&settings.token_secret),
            FacadeSettings {
                external_url: settings.external_url.clone(),
                wait: settings.check_wait,
                poll_interval: settings.poll_interval,
                report_link_ttl: settings.report_link_ttl,
            },
        );

        info!(
            requests_queue = workers::REQUESTS_QUEUE,
            reports_queue = workers::REPORTS_QUEUE,
            "Check pipeline started"
        );

        Ok(Self {
            registry,
            state: AppState {
                intake: Arc::new(intake),
                facade: Arc::new(facade),
            },
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn app_state(&self) -> AppState {
        self.state.clone()
    }

    pub fn registry(&self) -> Arc<CheckRegistry> {
        self.registry.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop consuming and wait for in-flight handlers and sweepers to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Pipeline task ended abnormally");
            }
        }
        info!("Check pipeline stopped");
    }
}
