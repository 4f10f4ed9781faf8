use crate::logging::LogFormat;

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "relay";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned service name used where allocation is required (e.g. serde).
#[must_use]
pub fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
