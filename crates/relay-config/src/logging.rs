//! Log output formats for webhook services.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Shape of the records a service writes to standard error.
///
/// Parsed case-insensitively from configuration files, `RELAY_LOG_FORMAT` and
/// `--log-format`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, with event fields flattened for log
    /// pipelines.
    #[default]
    Json,
    /// Single-line text for local runs.
    Compact,
}

/// Error returned when a log format name is not recognised.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::lowercase("json", LogFormat::Json)]
    #[case::mixed_case("Compact", LogFormat::Compact)]
    #[case::uppercase("JSON", LogFormat::Json)]
    fn formats_parse_ignoring_case(#[case] text: &str, #[case] expected: LogFormat) {
        assert_eq!(text.parse::<LogFormat>(), Ok(expected));
    }

    #[test]
    fn unknown_formats_are_rejected() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
