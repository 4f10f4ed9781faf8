//! Error types for dispatch failures.
//!
//! Everything except authentication failures ends up as a well-formed
//! [`Response`]. Authentication failures and undecodable bodies are reported
//! out of band through [`Rejection`].

use serde_json::json;
use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::platform::PlatformError;
use crate::request::RequestError;
use crate::response::Response;
use crate::schema::ValidationError;

/// Errors surfaced while processing an authenticated call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The envelope could not be decoded.
    #[error("invalid format: {message}")]
    MalformedEnvelope {
        /// Decoder message.
        message: String,
        /// Underlying decoder error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The envelope announces a newer protocol.
    #[error("unsupported version (> {supported})")]
    UnsupportedVersion {
        /// Version announced by the caller.
        version: i64,
        /// Highest supported version.
        supported: i64,
    },

    /// The envelope deadline has passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// No handler matches the event.
    #[error("not implemented")]
    NotImplemented {
        /// Event type of the call.
        event_type: String,
        /// Requested command, for command calls.
        command: Option<String>,
    },

    /// The payload violates the declared parameter schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A well-known payload field is missing or malformed.
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    /// A platform call made on behalf of the dispatch core failed.
    #[error("{operation}: {source}")]
    Platform {
        /// Operation that failed.
        operation: &'static str,
        /// Platform error.
        #[source]
        source: PlatformError,
    },

    /// Internal failure, such as a poisoned lock.
    #[error("internal error: {message}")]
    Internal {
        /// Failure description.
        message: String,
    },
}

impl DispatchError {
    /// Whether the caller may retry the call.
    ///
    /// Platform and internal failures are transient; protocol, validation and
    /// resolution failures are not.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Platform { .. } | Self::Internal { .. })
    }

    /// Converts the error into a fresh failed response.
    ///
    /// Validation failures also carry their structured context under the
    /// `validation` payload key.
    #[must_use]
    pub fn into_response(self) -> Response {
        let message = self.to_string();
        let response = if self.is_retriable() {
            Response::retriable(message)
        } else {
            Response::failure(message)
        };
        match self {
            Self::Validation(error) => response.with_data(
                "validation",
                json!({
                    "kind": error.kind.as_str(),
                    "key": error.key,
                    "expected": error.expected,
                    "actual": error.actual,
                }),
            ),
            _ => response,
        }
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(event_type: impl Into<String>, command: Option<String>) -> Self {
        Self::NotImplemented {
            event_type: event_type.into(),
            command,
        }
    }

    /// Creates a platform error.
    pub const fn platform(operation: &'static str, source: PlatformError) -> Self {
        Self::Platform { operation, source }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<EnvelopeError> for DispatchError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::Malformed { message, source } => {
                Self::MalformedEnvelope { message, source }
            }
            EnvelopeError::UnsupportedVersion { version, supported } => {
                Self::UnsupportedVersion { version, supported }
            }
            EnvelopeError::DeadlineExceeded { .. } => Self::DeadlineExceeded,
        }
    }
}

/// Calls refused before any envelope processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The signature did not authenticate the body.
    #[error("unauthenticated")]
    Unauthenticated,
    /// The body is not JSON.
    #[error("malformed body: {message}")]
    MalformedBody {
        /// Decoder message.
        message: String,
    },
}

impl Rejection {
    /// HTTP status the transport should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::MalformedBody { .. } => 400,
        }
    }
}

/// Result of [`Dispatcher::dispatch`](super::Dispatcher::dispatch).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The call was accepted and produced a response.
    Handled(Response),
    /// The call was refused at the transport boundary.
    Rejected(Rejection),
}

impl Outcome {
    /// HTTP status the transport should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Handled(_) => 200,
            Self::Rejected(rejection) => rejection.status_code(),
        }
    }

    /// Whether the call was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// Returns the response of a handled call.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Handled(response) => Some(response),
            Self::Rejected(_) => None,
        }
    }
}
