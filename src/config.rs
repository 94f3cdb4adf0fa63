//! Configuration system for Eclipse.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `ECLIPSE_SERVER_HOST` - Server bind address
//! - `ECLIPSE_SERVER_PORT` - Server port
//! - `ECLIPSE_LICENSE_KEY_PREFIX` - Default license key prefix
//! - `ECLIPSE_LICENSE_MAX_BATCH_SIZE` - Largest batch a single generate call may mint
//! - `ECLIPSE_LICENSE_COLLISION_RETRIES` - Draws per key before giving up on collisions
//! - `ECLIPSE_LOGGING_ENABLED` - Enable the tracing subscriber
//! - `ECLIPSE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<EclipseConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EclipseConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// License generation configuration
    pub license: LicenseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix used when a generate request does not supply one
    pub key_prefix: String,
    /// Maximum number of keys minted by one batch
    pub max_batch_size: u32,
    /// Fresh draws per key before a collision becomes fatal
    pub collision_retries: u32,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ECL".to_string(),
            max_batch_size: 1000,
            collision_retries: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl EclipseConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let defaults = Self::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("license.key_prefix", defaults.license.key_prefix)
            .map_err(config_err)?
            .set_default(
                "license.max_batch_size",
                i64::from(defaults.license.max_batch_size),
            )
            .map_err(config_err)?
            .set_default(
                "license.collision_retries",
                i64::from(defaults.license.collision_retries),
            )
            .map_err(config_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("ECLIPSE_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("ECLIPSE_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("ECLIPSE_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.max_batch_size",
                env_parsed::<i64>("ECLIPSE_LICENSE_MAX_BATCH_SIZE"),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.collision_retries",
                env_parsed::<i64>("ECLIPSE_LICENSE_COLLISION_RETRIES"),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("ECLIPSE_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("ECLIPSE_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if !crate::license_key::is_valid_prefix(&self.license.key_prefix) {
            return Err(LicenseError::ConfigError(format!(
                "license.key_prefix must be 1-16 ASCII letters or digits, got '{}'",
                self.license.key_prefix
            )));
        }
        if self.license.max_batch_size == 0 {
            return Err(LicenseError::ConfigError(
                "license.max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.license.collision_retries == 0 {
            return Err(LicenseError::ConfigError(
                "license.collision_retries must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static EclipseConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = EclipseConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static EclipseConfig> {
    get_config()
}
