//! Normalised request handed to handlers.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::envelope::{Dict, Envelope};
use crate::platform::OrgHandle;

/// Payload key naming the command to run.
pub const COMMAND_NAME_KEY: &str = "command_name";
/// Payload key naming the correlation channel.
pub const ROOM_ID_KEY: &str = "rid";
/// Payload key carrying the command identifier.
pub const COMMAND_ID_KEY: &str = "cid";
/// Payload key carrying the session identifier.
pub const SESSION_ID_KEY: &str = "ssid";

/// Errors raised when reading well-known payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The field is absent.
    #[error("missing {key} ({label})")]
    Missing {
        /// Payload key.
        key: &'static str,
        /// Human-readable name of the field.
        label: &'static str,
    },
    /// The field is present but is not a string.
    #[error("{key} is not a string")]
    NotAString {
        /// Payload key.
        key: &'static str,
    },
}

/// Event portion of a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Event type from the envelope.
    pub kind: String,
    /// Message identifier from the envelope.
    pub id: String,
    /// Event payload, possibly rewritten by the resolver.
    pub data: Dict,
}

/// Unit of work passed to every handler.
#[derive(Clone)]
pub struct Request {
    /// Organisation identifier; may be empty.
    pub org_id: String,
    /// Deadline carried by the envelope.
    pub deadline: Option<OffsetDateTime>,
    /// Triggering event.
    pub event: RequestEvent,
    /// Platform capability, present only for authenticated organisations.
    pub org: Option<Arc<dyn OrgHandle>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("org_id", &self.org_id)
            .field("deadline", &self.deadline)
            .field("event", &self.event)
            .field("org", &self.org.is_some())
            .finish()
    }
}

impl Request {
    /// Builds a request without a platform capability.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Dict) -> Self {
        Self {
            org_id: String::new(),
            deadline: None,
            event: RequestEvent {
                kind: kind.into(),
                id: String::new(),
                data,
            },
            org: None,
        }
    }

    /// Builds a request from a decoded envelope.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            org_id: envelope.org_id.clone(),
            deadline: envelope.deadline,
            event: RequestEvent {
                kind: envelope.event_type.clone(),
                id: envelope.message_id.clone(),
                data: envelope.data.clone(),
            },
            org: None,
        }
    }

    /// Attaches a platform capability.
    #[must_use]
    pub fn with_org(mut self, org: Arc<dyn OrgHandle>) -> Self {
        self.org = Some(org);
        self
    }

    /// Returns the correlation channel identifier.
    pub fn room_id(&self) -> Result<&str, RequestError> {
        self.string_field(ROOM_ID_KEY, "roomID")
    }

    /// Returns the command identifier.
    pub fn command_id(&self) -> Result<&str, RequestError> {
        self.string_field(COMMAND_ID_KEY, "commandID")
    }

    /// Returns the session identifier.
    pub fn session_id(&self) -> Result<&str, RequestError> {
        self.string_field(SESSION_ID_KEY, "sessionID")
    }

    /// Returns the requested command name.
    pub fn command_name(&self) -> Result<&str, RequestError> {
        self.string_field(COMMAND_NAME_KEY, "commandName")
    }

    fn string_field(&self, key: &'static str, label: &'static str) -> Result<&str, RequestError> {
        match self.event.data.get(key) {
            None => Err(RequestError::Missing { key, label }),
            Some(Value::String(text)) => Ok(text),
            Some(_) => Err(RequestError::NotAString { key }),
        }
    }
}
