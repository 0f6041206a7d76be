use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{env, path::Path, time::Duration};
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::store::StoreBackend;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
pub const DEV_DEFAULT_JWT_SECRET: &str =
    "keycraft_development_jwt_secret_do_not_ship_this_value_outside_dev_env";
pub const DEV_DEFAULT_PAYMENT_SECRET: &str = "keycraft_development_payment_secret";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// HS256 signing secret for access tokens
    #[serde(default = "default_jwt_secret")]
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    #[validate(range(min = 60, max = 604800))]
    pub jwt_expiration: u64,

    /// JWT issuer name
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// Persistence backend: "in-memory" or "file"
    #[serde(default)]
    pub store_backend: StoreBackend,

    /// Directory holding the JSON snapshots of the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Simulated latency added to every store operation (ms)
    #[serde(default)]
    pub store_latency_ms: u64,

    /// Simulated latency added to every payment gateway call (ms)
    #[serde(default)]
    pub gateway_latency_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Public payment key id, handed to clients
    #[serde(default = "default_payment_key_id")]
    #[validate(length(min = 1))]
    pub payment_key_id: String,

    /// Payment signing secret; server-side only
    #[serde(default = "default_payment_key_secret")]
    #[validate(length(min = 16))]
    pub payment_key_secret: String,

    /// Currency used when a payment intent does not name one
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Seed the admin account and initial catalog on startup
    #[serde(default = "default_true_bool")]
    pub seed_on_start: bool,

    /// Password of the seeded admin account
    #[serde(default = "default_admin_password")]
    #[validate(length(min = 6))]
    pub admin_password: String,

    /// Restrict order status updates to the forward fulfilment lifecycle
    #[serde(default)]
    pub enforce_status_transitions: bool,

    /// Number of gateway failures before the circuit breaker opens
    #[serde(default = "default_circuit_breaker_failures")]
    #[validate(range(min = 1))]
    pub circuit_breaker_failure_threshold: u32,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_timeout_secs: u64,

    /// Prefix every API route is nested under
    #[serde(default = "default_api_base_path")]
    #[validate(custom = "validate_api_base_path")]
    pub api_base_path: String,
}

impl Default for AppConfig {
    /// Development defaults, identical to what `load_config` yields with no
    /// files and no environment overrides.
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            jwt_secret: default_jwt_secret(),
            jwt_expiration: default_jwt_expiration(),
            auth_issuer: default_auth_issuer(),
            store_backend: StoreBackend::default(),
            data_dir: default_data_dir(),
            store_latency_ms: 0,
            gateway_latency_ms: 0,
            request_timeout_secs: default_request_timeout_secs(),
            payment_key_id: default_payment_key_id(),
            payment_key_secret: default_payment_key_secret(),
            default_currency: default_currency(),
            cors_allowed_origins: None,
            seed_on_start: default_true_bool(),
            admin_password: default_admin_password(),
            enforce_status_transitions: false,
            circuit_breaker_failure_threshold: default_circuit_breaker_failures(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout(),
            api_base_path: default_api_base_path(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Explicit CORS origins, trimmed, empty entries dropped
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn store_latency(&self) -> Duration {
        Duration::from_millis(self.store_latency_ms)
    }

    pub fn gateway_latency(&self) -> Duration {
        Duration::from_millis(self.gateway_latency_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if !self.is_development() && self.payment_key_secret.trim() == DEV_DEFAULT_PAYMENT_SECRET {
            let mut err = ValidationError::new("payment_key_secret_default_dev");
            err.message = Some(
                "The bundled development payment secret must not be used outside development. Set APP__PAYMENT_KEY_SECRET."
                    .into(),
            );
            errors.add("payment_key_secret", err);
        }

        if !self.is_development() && self.seed_on_start && self.admin_password == default_admin_password() {
            let mut err = ValidationError::new("admin_password_default_dev");
            err.message = Some(
                "Seeding the admin account with the development password is only allowed in development. Set APP__ADMIN_PASSWORD."
                    .into(),
            );
            errors.add("admin_password", err);
        }

        if !self.is_development() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Field validation plus the environment-dependent security checks.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
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

fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
}

fn default_jwt_expiration() -> u64 {
    86_400
}

fn default_auth_issuer() -> String {
    "keycraft-storefront".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_payment_key_id() -> String {
    "rzp_test_1234567890".to_string()
}

fn default_payment_key_secret() -> String {
    DEV_DEFAULT_PAYMENT_SECRET.to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true_bool() -> bool {
    true
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

fn default_circuit_breaker_failures() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

fn default_api_base_path() -> String {
    "/api".to_string()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_api_base_path(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') && (path.len() == 1 || !path.ends_with('/')) {
        Ok(())
    } else {
        let mut err = ValidationError::new("api_base_path");
        err.message = Some("Must start with '/' and have no trailing '/'".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate_all().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        environment = %app_config.environment,
        store_backend = %app_config.store_backend,
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
