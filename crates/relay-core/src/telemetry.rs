//! Process-wide structured logging for webhook services.
//!
//! Dispatch, overlay and reporter events are emitted through `tracing` under
//! `relay_core::*` targets. [`initialise`] routes them to standard error in
//! the format chosen by [`Config::log_format`].

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use relay_config::{Config, LogFormat};

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the process logs through the service subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the subscriber that is actually installed.
    ///
    /// This is the format of the first successful initialisation, which may
    /// differ from the configuration passed to a later call.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter is not a valid directive list.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Filter text from the configuration.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another subscriber was already installed by the host process.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the service subscriber on first use.
///
/// The log filter is checked on every call. Once a subscriber is installed,
/// later calls return a handle for it without reinstalling.
///
/// # Examples
///
/// ```rust
/// use relay_config::{Config, LogFormat};
/// use relay_core::telemetry;
///
/// # fn main() -> Result<(), relay_core::telemetry::TelemetryError> {
/// let handle = telemetry::initialise(&Config::default())?;
/// assert_eq!(handle.format(), LogFormat::Json);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    INSTALLED_FORMAT
        .get_or_try_init(|| install_subscriber(filter, config.log_format()))
        .map(|format| TelemetryHandle { format: *format })
}

fn parse_filter(filter: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter {
        filter: filter.to_owned(),
        message: error.to_string(),
    })
}

fn install_subscriber(filter: EnvFilter, format: LogFormat) -> Result<LogFormat, TelemetryError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        // Colour only on interactive terminals.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(log_filter: &str, log_format: LogFormat) -> Config {
        Config {
            log_filter: String::from(log_filter),
            log_format,
            ..Config::default()
        }
    }

    #[test]
    fn first_installed_format_wins() {
        let first = initialise(&config_with("info", LogFormat::Json)).expect("telemetry installs");
        let second =
            initialise(&config_with("debug", LogFormat::Compact)).expect("telemetry reused");

        assert_eq!(first.format(), LogFormat::Json);
        assert_eq!(second, first);
    }

    #[test]
    fn invalid_filters_are_reported_even_after_installation() {
        let error = initialise(&config_with("relay_core=loud", LogFormat::Json))
            .expect_err("filter must be rejected");

        assert!(matches!(
            error,
            TelemetryError::Filter { ref filter, .. } if filter == "relay_core=loud"
        ));
    }
}
