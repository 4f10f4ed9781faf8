//! Layered configuration for relay services.
//!
//! Values are resolved by `ortho_config` from built-in defaults, an optional
//! configuration file, `RELAY_*` environment variables and command-line flags,
//! in increasing order of precedence.

mod defaults;
mod logging;

use std::fmt;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_SERVICE_NAME, default_log_filter, default_log_filter_string,
    default_log_format, default_service_name,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved service configuration.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RELAY")]
pub struct Config {
    /// Service name announced to the control plane and used to derive the
    /// continuation namespace.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Shared secret used to verify inbound signatures and to derive
    /// interactive callback identities.
    #[serde(default)]
    pub secret_key: String,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Logs request and response summaries at `debug` level when enabled.
    #[serde(default)]
    pub trace_comms: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            secret_key: String::new(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            trace_comms: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("service_name", &self.service_name)
            .field("secret_key", &"<redacted>")
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .field("trace_comms", &self.trace_comms)
            .finish()
    }
}

/// Errors raised when a loaded configuration is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The service name was empty.
    #[error("service name must not be empty")]
    EmptyServiceName,
    /// The service name contained a character reserved by the continuation
    /// namespace.
    #[error("service name '{name}' must not contain '/'")]
    InvalidServiceName {
        /// Offending service name.
        name: String,
    },
}

impl Config {
    /// Service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Shared secret as raw bytes.
    #[must_use]
    pub fn secret_key(&self) -> &[u8] {
        self.secret_key.as_bytes()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether request and response summaries are logged.
    #[must_use]
    pub const fn trace_comms(&self) -> bool {
        self.trace_comms
    }

    /// Checks invariants that the loader cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.service_name.contains('/') {
            return Err(ConfigError::InvalidServiceName {
                name: self.service_name.clone(),
            });
        }
        Ok(())
    }
}
