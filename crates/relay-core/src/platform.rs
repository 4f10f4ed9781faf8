//! Capability boundary towards the external platform.
//!
//! The dispatch core never talks to the platform directly. A per-call
//! [`OrgHandle`] is obtained from an [`OrgConnector`] when an envelope carries
//! both an organisation id and a credential; every operation on it is a
//! fallible remote call without retries.

use std::sync::Arc;

use thiserror::Error;

use crate::envelope::Dict;

/// Kinds of message that can be posted to a correlation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Acknowledges receipt of a command.
    CommandAck,
}

impl MessageKind {
    /// Returns the platform name of the message kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommandAck => "command_ack",
        }
    }
}

/// Errors returned by the external platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// A capability object could not be created for an organisation.
    #[error("failed to connect to organisation '{org_id}': {message}")]
    Connect {
        /// Organisation identifier.
        org_id: String,
        /// Failure reported by the platform.
        message: String,
    },
    /// A remote operation failed.
    #[error("{operation} failed: {message}")]
    Operation {
        /// Name of the failing operation.
        operation: String,
        /// Failure reported by the platform.
        message: String,
    },
}

impl PlatformError {
    /// Creates a connection error.
    pub fn connect(org_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            org_id: org_id.into(),
            message: message.into(),
        }
    }

    /// Creates an operation error.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Remote operations available for one authenticated organisation.
pub trait OrgHandle: Send + Sync {
    /// Posts a message to the correlation channel `room_id`.
    fn post_message(&self, room_id: &str, kind: MessageKind, content: &Dict)
    -> Result<(), PlatformError>;

    /// Replaces the rules named in `rules` with the supplied content.
    ///
    /// Pushing the same rule set twice leaves the platform unchanged.
    fn sync_rules(&self, rules: &Dict) -> Result<(), PlatformError>;

    /// Deletes the rule called `name`.
    fn delete_rule(&self, name: &str) -> Result<(), PlatformError>;

    /// Tasks a sensor, asking the platform to echo `correlation` on every
    /// resulting event.
    fn task_sensor(&self, sensor_id: &str, task: &str, correlation: &str)
    -> Result<(), PlatformError>;
}

/// Factory creating an [`OrgHandle`] from envelope credentials.
pub trait OrgConnector: Send + Sync {
    /// Connects to `org_id` using `auth_token`.
    fn connect(&self, org_id: &str, auth_token: &str) -> Result<Arc<dyn OrgHandle>, PlatformError>;
}

impl<T> OrgConnector for Arc<T>
where
    T: OrgConnector + ?Sized,
{
    fn connect(&self, org_id: &str, auth_token: &str) -> Result<Arc<dyn OrgHandle>, PlatformError> {
        (**self).connect(org_id, auth_token)
    }
}
