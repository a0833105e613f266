use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use aml_gateway::{
    config::{BusBackend, Config, DEFAULT_TOKEN_SECRET},
    handlers,
    hooks::NoopCompletionHook,
    middleware::RateLimiter,
    storage::LocalBlobStore,
    Capabilities, Pipeline, PipelineSettings,
};
use anyhow::Context;
use compliance_service::{
    HttpSanctionsProvider, HttpSanctionsProviderConfig, SanctionsEngine, SanctionsProvider,
};
use dotenv::dotenv;
use message_bus::{EventBus, InMemoryBus, JetStreamBus};
use risk_engine::{DeterministicRiskScorer, HttpRiskProvider, HttpRiskProviderConfig, RiskProvider};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aml_gateway=debug,message_bus=info,actix_web=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn build_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    let policy = config.bus.retry_policy();
    Ok(match config.bus.backend {
        BusBackend::Memory => {
            info!("Using in-process event bus");
            Arc::new(InMemoryBus::with_policy(policy))
        }
        BusBackend::Nats => {
            let bus = JetStreamBus::connect(config.bus.jetstream_config(), policy)
                .await
                .context("Failed to connect to NATS JetStream")?;
            Arc::new(bus)
        }
    })
}

fn build_risk_provider(config: &Config) -> anyhow::Result<Arc<dyn RiskProvider>> {
    let providers = &config.providers;
    if providers.risk_base_url.is_empty() || providers.risk_api_key.is_empty() {
        warn!("No risk provider credentials, using deterministic scorer");
        return Ok(Arc::new(DeterministicRiskScorer::new()));
    }

    let provider = HttpRiskProvider::new(HttpRiskProviderConfig::new(
        providers.risk_base_url.clone(),
        providers.risk_api_key.clone(),
    ))?;
    Ok(Arc::new(provider))
}

fn build_sanctions_provider(config: &Config) -> anyhow::Result<Arc<dyn SanctionsProvider>> {
    let providers = &config.providers;
    if providers.sanctions_api_key.is_empty() {
        warn!("No sanctions API key, screening against the in-memory list");
        return Ok(Arc::new(SanctionsEngine::new()));
    }

    let provider = HttpSanctionsProvider::new(
        HttpSanctionsProviderConfig::new(providers.sanctions_api_key.clone())
            .with_base_url(providers.sanctions_base_url.clone()),
    )?;
    Ok(Arc::new(provider))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    init_tracing(&config.log.format);

    info!("Starting AML Gateway...");
    if config.security.token_secret == DEFAULT_TOKEN_SECRET {
        warn!("TOKEN_SECRET is not set, report links are signed with the default secret");
    }

    let blob_store = LocalBlobStore::open(&config.storage.report_dir)
        .await
        .context("Failed to open report storage")?;

    let capabilities = Capabilities {
        bus: build_bus(&config).await?,
        risk: build_risk_provider(&config)?,
        sanctions: build_sanctions_provider(&config)?,
        blob_store: Arc::new(blob_store),
        hook: Arc::new(NoopCompletionHook),
    };
    let pipeline = Pipeline::start(capabilities, PipelineSettings::from_config(&config)).await?;

    let state = web::Data::new(pipeline.app_state());
    let rate_limiter = RateLimiter::new(config.security.rate_limit_per_minute);
    let cors_origin = config.security.cors_allowed_origin.clone();
    let server_config = config.server.clone();

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_any_header()
            .max_age(3600);
        let cors = if cors_origin == "*" {
            cors.allow_any_origin()
        } else {
            cors.allowed_origin(&cors_origin)
        };

        App::new()
            .app_data(state.clone())
            .wrap(rate_limiter.clone())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    info!("HTTP server stopped, draining pipeline");
    pipeline.shutdown().await;
    Ok(())
}
