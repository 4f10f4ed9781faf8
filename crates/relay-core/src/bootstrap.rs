//! Service bootstrap orchestration.
//!
//! Loads configuration, validates it, installs telemetry and hands back a
//! [`ServiceBuilder`] seeded from the loaded values.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use relay_config::{Config, ConfigError};

use crate::dispatch::ServiceBuilder;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the service configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    Invalid {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Result of a successful bootstrap invocation.
#[derive(Debug)]
pub struct Bootstrapped {
    config: Config,
    telemetry: TelemetryHandle,
}

impl Bootstrapped {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts a service descriptor from the resolved configuration.
    #[must_use]
    pub fn service(&self) -> ServiceBuilder {
        ServiceBuilder::from_config(&self.config)
    }
}

/// Bootstraps a service using the supplied configuration loader.
///
/// # Errors
///
/// Returns an error when configuration cannot be loaded or validated, or
/// when telemetry cannot be installed.
pub fn bootstrap_with(loader: &dyn ConfigLoader) -> Result<Bootstrapped, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::Invalid { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    tracing::info!(
        target: concat!(env!("CARGO_PKG_NAME"), "::bootstrap"),
        service = config.service_name(),
        "service bootstrapped"
    );
    Ok(Bootstrapped { config, telemetry })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use rstest::rstest;

    use super::*;

    struct StaticLoader(Config);

    impl ConfigLoader for StaticLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Ok(self.0.clone())
        }
    }

    /// Loader that fails by passing an unknown command-line flag.
    struct FailingLoader;

    impl ConfigLoader for FailingLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter([
                OsString::from("relay"),
                OsString::from("--no-such-flag"),
            ])
        }
    }

    /// Loader that parses a fixed command line.
    struct ArgsLoader(&'static [&'static str]);

    impl ConfigLoader for ArgsLoader {
        fn load(&self) -> Result<Config, Arc<OrthoError>> {
            Config::load_from_iter(self.0.iter().map(OsString::from))
        }
    }

    fn config_named(name: &str) -> Config {
        Config {
            service_name: String::from(name),
            secret_key: String::from("s3cret"),
            ..Config::default()
        }
    }

    #[test]
    fn bootstrap_seeds_the_service_builder() {
        let bootstrapped =
            bootstrap_with(&StaticLoader(config_named("scanner"))).expect("bootstrap succeeds");

        assert_eq!(bootstrapped.config().service_name(), "scanner");
        let dispatcher = bootstrapped.service().build().expect("service builds");
        assert_eq!(dispatcher.service_name(), "scanner");
        assert_eq!(dispatcher.secret_key(), b"s3cret");
    }

    #[test]
    fn command_line_values_reach_the_service() {
        let loader = ArgsLoader(&[
            "relay",
            "--service-name",
            "sweeper",
            "--secret-key",
            "from-cli",
        ]);
        let bootstrapped = bootstrap_with(&loader).expect("bootstrap succeeds");

        let dispatcher = bootstrapped.service().build().expect("service builds");
        assert_eq!(dispatcher.service_name(), "sweeper");
        assert_eq!(dispatcher.secret_key(), b"from-cli");
    }

    #[rstest]
    #[case::empty("")]
    #[case::slash("a/b")]
    fn invalid_service_names_fail_bootstrap(#[case] name: &str) {
        let error = bootstrap_with(&StaticLoader(config_named(name))).expect_err("must fail");
        assert!(matches!(error, BootstrapError::Invalid { .. }));
    }

    #[test]
    fn loader_failures_are_reported() {
        let error = bootstrap_with(&FailingLoader).expect_err("must fail");
        assert!(matches!(error, BootstrapError::Configuration { .. }));
    }
}
