//! Errors raised while registering handlers.

use thiserror::Error;

use crate::schema::ValidationError;

/// Errors surfaced while assembling callback tables and command registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A command was declared without a name.
    #[error("command name cannot be empty")]
    EmptyCommandName,

    /// A command was declared without a description.
    #[error("command '{command}' description is empty")]
    EmptyDescription {
        /// Command name.
        command: String,
    },

    /// A command parameter declaration is malformed.
    #[error("command '{command}' has an invalid parameter: {source}")]
    InvalidParameter {
        /// Command name.
        command: String,
        /// Schema violation.
        #[source]
        source: ValidationError,
    },

    /// A command was declared without a handler.
    #[error("command '{command}' has no handler")]
    MissingHandler {
        /// Command name.
        command: String,
    },

    /// Another command with the same name is already registered.
    #[error("command '{command}' is already registered")]
    DuplicateCommand {
        /// Command name.
        command: String,
    },

    /// The callback name is provided by the dispatch core.
    #[error("callback '{name}' is reserved")]
    ReservedCallback {
        /// Callback name.
        name: &'static str,
    },

    /// Another callback with the same name is already registered.
    #[error("callback '{name}' is already registered")]
    DuplicateCallback {
        /// Callback name.
        name: &'static str,
    },

    /// A declared request parameter is malformed.
    #[error("invalid request parameter: {source}")]
    InvalidRequestParameter {
        /// Schema violation.
        #[source]
        source: ValidationError,
    },

    /// The service name cannot be used to build a continuation namespace.
    #[error("invalid service name '{name}'")]
    InvalidServiceName {
        /// Offending name.
        name: String,
    },

    /// The service was built without a shared secret.
    #[error("secret key cannot be empty")]
    EmptySecretKey,

    /// The command registry lock was poisoned by a panicking writer.
    #[error("command registry lock poisoned")]
    RegistryPoisoned,

    /// The interactive callback name was empty.
    #[error("interactive callback name cannot be empty")]
    EmptyCallbackName,
}
