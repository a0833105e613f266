use config::{ConfigError, Environment};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub bus: BusConfig,
    pub providers: ProvidersConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub external_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    pub check_wait_seconds: u64,
    pub poll_interval_millis: u64,
    pub check_ttl_hours: i64,
    pub report_ttl_hours: i64,
    pub report_link_ttl_hours: i64,
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Memory,
    Nats,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub nats_url: String,
    pub stream_prefix: String,
    pub max_retries: u32,
    pub retry_base_delay_millis: u64,
    pub retry_max_delay_millis: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    /// Empty selects the deterministic offline scorer
    pub risk_base_url: String,
    pub risk_api_key: String,
    /// Empty selects the in-memory sanctions list
    pub sanctions_api_key: String,
    pub sanctions_base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub report_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    pub token_secret: String,
    pub cors_allowed_origin: String,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// `json` or `pretty`
    pub format: String,
}

pub const DEFAULT_TOKEN_SECRET: &str = "change-me-in-production";

/// Flat variables of the original deployment and the keys they override
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("SERVICE_PORT", "server.port"),
    ("EXTERNAL_URL", "server.external_url"),
    ("CHECK_WAIT_SECONDS", "pipeline.check_wait_seconds"),
    ("CHECK_TTL_HOURS", "pipeline.check_ttl_hours"),
    ("REPORT_TTL_HOURS", "pipeline.report_ttl_hours"),
    ("CLEANUP_INTERVAL_MINUTES", "pipeline.cleanup_interval_minutes"),
    ("TOKEN_SECRET", "security.token_secret"),
    ("NATS_URL", "bus.nats_url"),
    ("AMLBOT_BASE_URL", "providers.risk_base_url"),
    ("AMLBOT_API_KEY", "providers.risk_api_key"),
    ("CHAINALYSIS_API_KEY", "providers.sanctions_api_key"),
    ("REPORT_STORAGE_DIR", "storage.report_dir"),
    ("CORS_ALLOWED_ORIGIN", "security.cors_allowed_origin"),
    ("RATE_LIMIT_PER_MINUTE", "security.rate_limit_per_minute"),
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(env::vars())
    }

    /// Defaults, then `AML__*` variables, then the legacy flat variables,
    /// all read from `vars`
    pub fn load(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let mut builder = config::Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("server.external_url", "http://localhost:8080")?
            // Pipeline defaults
            .set_default("pipeline.check_wait_seconds", 20)?
            .set_default("pipeline.poll_interval_millis", 500)?
            .set_default("pipeline.check_ttl_hours", 24)?
            .set_default("pipeline.report_ttl_hours", 24)?
            .set_default("pipeline.report_link_ttl_hours", 24)?
            .set_default("pipeline.cleanup_interval_minutes", 10)?
            // Bus defaults
            .set_default("bus.backend", "memory")?
            .set_default("bus.nats_url", "nats://localhost:4222")?
            .set_default("bus.stream_prefix", "aml")?
            .set_default("bus.max_retries", 3)?
            .set_default("bus.retry_base_delay_millis", 200)?
            .set_default("bus.retry_max_delay_millis", 5000)?
            // Providers
            .set_default("providers.risk_base_url", "")?
            .set_default("providers.risk_api_key", "")?
            .set_default("providers.sanctions_api_key", "")?
            .set_default(
                "providers.sanctions_base_url",
                compliance_service::screening::DEFAULT_SCREENING_URL,
            )?
            // Storage
            .set_default("storage.report_dir", "./reports")?
            // Security
            .set_default("security.token_secret", DEFAULT_TOKEN_SECRET)?
            .set_default("security.cors_allowed_origin", "*")?
            .set_default("security.rate_limit_per_minute", 100)?
            // Logging
            .set_default("log.format", "json")?;

        builder = builder.add_source(
            Environment::with_prefix("AML")
                .separator("__")
                .source(Some(vars.clone().into_iter().collect())),
        );

        // ADDR is host:port, either part may be empty
        if let Some(addr) = vars.get("ADDR") {
            if let Some((host, port)) = addr.rsplit_once(':') {
                if !host.is_empty() {
                    builder = builder.set_override("server.host", host)?;
                }
                if !port.is_empty() {
                    builder = builder.set_override("server.port", port)?;
                }
            }
        }

        for (var, key) in LEGACY_OVERRIDES {
            if let Some(value) = vars.get(*var) {
                builder = builder.set_override(*key, value.as_str())?;
            }
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.pipeline.poll_interval_millis == 0 {
            return Err("Poll interval must be positive".to_string());
        }

        if self.pipeline.check_ttl_hours <= 0
            || self.pipeline.report_ttl_hours <= 0
            || self.pipeline.report_link_ttl_hours <= 0
        {
            return Err("Check, report and report link TTLs must be positive".to_string());
        }

        if self.pipeline.cleanup_interval_minutes == 0 {
            return Err("Cleanup interval must be positive".to_string());
        }

        if self.security.token_secret.is_empty() {
            return Err("Token secret is required".to_string());
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err("Rate limit must be positive".to_string());
        }

        if self.bus.backend == BusBackend::Nats && self.bus.nats_url.is_empty() {
            return Err("NATS URL is required for the nats backend".to_string());
        }

        Ok(())
    }
}

impl PipelineConfig {
    pub fn check_wait(&self) -> Duration {
        Duration::from_secs(self.check_wait_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn check_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.check_ttl_hours)
    }

    pub fn report_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.report_ttl_hours)
    }

    pub fn report_link_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.report_link_ttl_hours)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }
}

impl BusConfig {
    pub fn retry_policy(&self) -> message_bus::RetryPolicy {
        message_bus::RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_millis),
            max_delay: Duration::from_millis(self.retry_max_delay_millis),
        }
    }

    /// Stream and subject names derived from the prefix
    pub fn jetstream_config(&self) -> message_bus::JetStreamConfig {
        let prefix = self.stream_prefix.to_lowercase();
        let stream = prefix.to_uppercase();
        message_bus::JetStreamConfig {
            url: self.nats_url.clone(),
            stream_name: format!("{}_EVENTS", stream),
            subject_prefix: format!("{}.events", prefix),
            retry_prefix: format!("{}.retry", prefix),
            dlq_stream_name: format!("{}_DLQ", stream),
            dlq_prefix: format!("{}.dlq", prefix),
            ..message_bus::JetStreamConfig::default()
        }
    }
}
