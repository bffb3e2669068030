//! Service configuration.
//!
//! Values come from an optional `config.toml` and are overridden by
//! environment variables prefixed with `SNOW_` (`SNOW_PORT`,
//! `SNOW_SNOW_URL`, ...).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

use crate::auth::basic_enabled;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "SNOW";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The values were read but do not make sense
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Immutable settings for the lifetime of the process.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Service instance identifier, used in logs.
    pub id: String,
    /// Log verbosity (trace, debug, info, warn, error).
    pub log_level: String,
    /// Inbound authentication mode (`basic` or anything else for none).
    pub auth_mode: String,
    /// First path segment of the webhook route.
    pub path: String,
    /// HTTP listen port.
    pub port: u16,
    /// Inbound Basic auth user.
    pub username: String,
    /// Inbound Basic auth password.
    pub password: String,
    /// Whether `/metrics` is served.
    pub metrics: bool,
    /// ServiceNow instance URL.
    pub snow_url: String,
    /// ServiceNow API user.
    pub snow_username: String,
    /// ServiceNow API password.
    pub snow_password: String,
    /// Upper bound on one outbound ticket call, in seconds.
    pub request_timeout_secs: u64,
    /// Time in-flight requests get to finish after a shutdown signal, in seconds.
    pub shutdown_grace_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("id", &self.id)
            .field("log_level", &self.log_level)
            .field("auth_mode", &self.auth_mode)
            .field("path", &self.path)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("metrics", &self.metrics)
            .field("snow_url", &self.snow_url)
            .field("snow_username", &self.snow_username)
            .field("snow_password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .finish()
    }
}

impl Config {
    /// Load from `path` (or `./config.toml` if present) plus `SNOW_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Self::from_sources(
            file,
            config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    /// Build from an explicit file source and environment source.
    pub fn from_sources<S>(file: S, env: config::Environment) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .set_default("id", "snow-bridge")?
            .set_default("log_level", "info")?
            .set_default("auth_mode", "none")?
            .set_default("path", "alerts")?
            .set_default("port", 8080)?
            .set_default("username", "")?
            .set_default("password", "")?
            .set_default("metrics", false)?
            .set_default("snow_url", "")?
            .set_default("snow_username", "")?
            .set_default("snow_password", "")?
            .set_default("request_timeout_secs", 30)?
            .set_default("shutdown_grace_secs", 5)?
            .add_source(file)
            .add_source(env)
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.snow_url.trim().is_empty() {
            return Err(ConfigError::Invalid("snow_url must be set".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        if self.basic_auth() && self.username.is_empty() {
            return Err(ConfigError::Invalid(
                "username must be set when auth_mode is basic".to_string(),
            ));
        }
        if self.path.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether inbound requests must carry Basic credentials.
    #[must_use]
    pub fn basic_auth(&self) -> bool {
        basic_enabled(&self.auth_mode)
    }

    /// Parsed log level, or `None` if `log_level` is not a level name.
    #[must_use]
    pub fn log_level(&self) -> Option<Level> {
        self.log_level.trim().parse().ok()
    }

    /// Whether failed payloads should be dumped to the log.
    #[must_use]
    pub fn debug_level(&self) -> bool {
        self.log_level().is_some_and(|level| level >= Level::DEBUG)
    }

    /// Webhook route, e.g. `/alerts/{partition}`.
    #[must_use]
    pub fn webhook_route(&self) -> String {
        format!("/{}/{{partition}}", self.path.trim_matches('/'))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
