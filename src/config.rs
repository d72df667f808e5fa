use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Monetary severity thresholds for variance classification.
///
/// These are business policy, not code: a variance whose absolute monetary
/// value exceeds `critical` is classified critical, above `high` is high,
/// above `medium` is medium, anything else low.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarianceThresholds {
    #[serde(default = "default_critical_threshold")]
    pub critical: Decimal,
    #[serde(default = "default_high_threshold")]
    pub high: Decimal,
    #[serde(default = "default_medium_threshold")]
    pub medium: Decimal,
}

fn default_critical_threshold() -> Decimal {
    Decimal::new(10_000, 0)
}
fn default_high_threshold() -> Decimal {
    Decimal::new(5_000, 0)
}
fn default_medium_threshold() -> Decimal {
    Decimal::new(1_000, 0)
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            critical: default_critical_threshold(),
            high: default_high_threshold(),
            medium: default_medium_threshold(),
        }
    }
}

impl VarianceThresholds {
    /// Thresholds must be strictly ordered or classification is ambiguous.
    pub fn validate_ordering(&self) -> Result<(), ConfigError> {
        if self.critical > self.high && self.high > self.medium && self.medium > Decimal::ZERO {
            Ok(())
        } else {
            Err(ConfigError::Message(format!(
                "variance thresholds must satisfy critical > high > medium > 0, got {} / {} / {}",
                self.critical, self.high, self.medium
            )))
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to build the schema on startup (development / SQLite setups)
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Request timeout for the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Monetary cutoffs for variance severity classification
    #[serde(default)]
    pub variance_thresholds: VarianceThresholds,

    /// Role slugs that receive variance alert notifications
    #[serde(default = "default_alert_roles")]
    pub alert_roles: Vec<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
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
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_alert_roles() -> Vec<String> {
    vec!["outlet_manager".to_string(), "area_manager".to_string()]
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads configuration from `config/default.toml`, an optional
/// environment-specific file, and `TRANSFERDESK__`-prefixed environment
/// variables (highest precedence).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false))
        .add_source(
            Environment::with_prefix("TRANSFERDESK")
                .separator("__")
                .try_parsing(true),
        );

    // DATABASE_URL is honored without the prefix, matching deployment
    // conventions.
    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database_url", url)?;
    }

    let config: AppConfig = builder.build()?.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
    config.variance_thresholds.validate_ordering()?;

    info!(
        environment = %config.environment,
        host = %config.host,
        port = config.port,
        "configuration loaded"
    );

    Ok(config)
}

/// Installs the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
