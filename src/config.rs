use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration, loaded once at startup and shared read-only
/// behind `Arc` for the lifetime of the process.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL. Required.
    pub database_url: String,

    /// Server bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment (development/production/test).
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit structured JSON logs instead of plain-text.
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run pending migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    /// API key for the distributor search service. Required.
    pub distributor_api_key: String,

    /// Base URL for the distributor search service.
    #[serde(default = "default_distributor_base_url")]
    pub distributor_api_base_url: String,

    /// API key for the LLM backend. Required.
    pub llm_api_key: String,

    /// Base URL for the LLM backend.
    #[serde(default = "default_llm_base_url")]
    pub llm_api_base_url: String,

    /// Width of the per-project matching worker pool.
    #[serde(default = "default_worker_pool_width")]
    #[validate(range(min = 1, max = 64))]
    pub worker_pool_width: usize,

    /// Maximum age, in seconds, of a cache entry still considered fresh.
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: i64,

    /// Minimum spacing between distributor requests, in milliseconds.
    #[serde(default = "default_distributor_request_delay_ms")]
    pub distributor_request_delay_ms: u64,

    /// Delay between distributor retry attempts, in milliseconds.
    #[serde(default = "default_distributor_retry_delay_ms")]
    pub distributor_retry_delay_ms: u64,

    /// Maximum number of retry attempts on retriable distributor failures.
    #[serde(default = "default_distributor_max_retries")]
    pub distributor_max_retries: u32,

    /// Per-request timeout for distributor calls, in seconds.
    #[serde(default = "default_distributor_timeout_secs")]
    pub distributor_timeout_secs: u64,

    /// QueueRunner poll interval when idle, in milliseconds.
    #[serde(default = "default_queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,

    /// QueueRunner backoff after a loop-level error, in seconds.
    #[serde(default = "default_queue_error_backoff_secs")]
    pub queue_error_backoff_secs: u64,

    /// Maximum number of BOM rows accepted per project.
    #[serde(default = "default_bom_max_items")]
    pub bom_max_items: usize,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_distributor_base_url() -> String {
    "https://api.mouser.com/api/v1".to_string()
}
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_worker_pool_width() -> usize {
    5
}
fn default_cache_max_age_secs() -> i64 {
    86_400
}
fn default_distributor_request_delay_ms() -> u64 {
    500
}
fn default_distributor_retry_delay_ms() -> u64 {
    10_000
}
fn default_distributor_max_retries() -> u32 {
    3
}
fn default_distributor_timeout_secs() -> u64 {
    15
}
fn default_queue_poll_interval_ms() -> u64 {
    1_000
}
fn default_queue_error_backoff_secs() -> u64 {
    60
}
fn default_bom_max_items() -> usize {
    20
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"];
    if valid.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes the global `tracing` subscriber. The default filter directive
/// scopes this crate to `level` and silences noisy dependency chatter, unless
/// `RUST_LOG` overrides it explicitly.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("pcb_part_finder={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    let result = if json {
        fmt().with_env_filter(filter).json().try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {}", e);
    }
}

/// Loads configuration from, in increasing precedence: built-in defaults,
/// `config/default.toml`, `config/{RUN_ENV}.toml`, then `APP__`-prefixed
/// environment variables (`__` as the nesting separator).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "config directory '{}' not found; relying on defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("host", default_host())?
        .set_default("port", default_port() as i64)?
        .set_default("environment", default_environment())?
        .set_default("log_level", default_log_level())?
        .set_default("log_json", false)?
        .set_default("auto_migrate", false)?
        .set_default("distributor_api_base_url", default_distributor_base_url())?
        .set_default("llm_api_base_url", default_llm_base_url())?
        .set_default("worker_pool_width", default_worker_pool_width() as i64)?
        .set_default("cache_max_age_secs", default_cache_max_age_secs())?
        .set_default(
            "distributor_request_delay_ms",
            default_distributor_request_delay_ms() as i64,
        )?
        .set_default(
            "distributor_retry_delay_ms",
            default_distributor_retry_delay_ms() as i64,
        )?
        .set_default(
            "distributor_max_retries",
            default_distributor_max_retries() as i64,
        )?
        .set_default(
            "distributor_timeout_secs",
            default_distributor_timeout_secs() as i64,
        )?
        .set_default(
            "queue_poll_interval_ms",
            default_queue_poll_interval_ms() as i64,
        )?
        .set_default(
            "queue_error_backoff_secs",
            default_queue_error_backoff_secs() as i64,
        )?
        .set_default("bom_max_items", default_bom_max_items() as i64)?
        .set_default("db_max_connections", default_db_max_connections() as i64)?
        .set_default("db_min_connections", default_db_min_connections() as i64)?
        .set_default(
            "db_acquire_timeout_secs",
            default_db_acquire_timeout_secs() as i64,
        )?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let raw = builder.build()?;

    for required in ["database_url", "distributor_api_key", "llm_api_key"] {
        if raw.get_string(required).is_err() {
            error!(
                "required configuration value '{}' is missing; set APP__{} or add it to config/default.toml",
                required,
                required.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                required
            ))));
        }
    }

    let app_config: AppConfig = raw.try_deserialize()?;
    app_config.validate().map_err(|e| {
        error!("configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn set_required_env() {
        env::set_var("APP__DATABASE_URL", "sqlite://:memory:");
        env::set_var("APP__DISTRIBUTOR_API_KEY", "test-distributor-key");
        env::set_var("APP__LLM_API_KEY", "test-llm-key");
    }

    #[test]
    #[ignore = "mutates process-wide environment; run with --test-threads=1"]
    fn load_config_fills_defaults_from_env_only() {
        set_required_env();
        env::remove_var("RUN_ENV");
        env::remove_var("APP_ENV");
        let cfg = load_config().expect("config should load from env alone");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.worker_pool_width, 5);
        assert_eq!(cfg.cache_max_age_secs, 86_400);
    }

    #[test]
    #[ignore = "mutates process-wide environment and CWD; run with --test-threads=1"]
    fn load_config_missing_required_key_is_actionable() {
        env::remove_var("APP__DATABASE_URL");
        env::remove_var("APP__DISTRIBUTOR_API_KEY");
        env::remove_var("APP__LLM_API_KEY");
        let err = load_config().unwrap_err();
        assert!(matches!(err, AppConfigError::Load(_)));
    }

    #[test]
    #[ignore = "mutates process-wide environment and CWD; run with --test-threads=1"]
    fn load_config_layers_file_then_env_override() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        let mut f = std::fs::File::create(config_dir.join("default.toml")).unwrap();
        writeln!(
            f,
            "database_url = \"sqlite://from-file.db\"\ndistributor_api_key = \"file-key\"\nllm_api_key = \"file-key\"\nport = 9999"
        )
        .unwrap();

        let original_dir = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();
        env::set_var("APP__PORT", "7000");

        let result = load_config();
        env::set_current_dir(original_dir).unwrap();
        env::remove_var("APP__PORT");

        let cfg = result.expect("config should load from file + env override");
        assert_eq!(cfg.port, 7000, "env var must override file value");
        assert_eq!(cfg.database_url, "sqlite://from-file.db");
    }
}
