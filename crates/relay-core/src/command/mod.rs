//! Named commands and their registry.
//!
//! Commands are resolved by the `command_name` payload field. The registry
//! rejects invalid descriptors at registration time so resolution never has
//! to deal with a half-declared command.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::callbacks::Handler;
use crate::registration::RegistrationError;
use crate::schema::{ParameterDef, ParameterMap, check_parameters};

/// Declaration of a command.
#[derive(Clone, Serialize)]
pub struct CommandDescriptor {
    name: String,
    #[serde(rename = "desc")]
    description: String,
    #[serde(rename = "args")]
    parameters: ParameterMap,
    #[serde(skip)]
    handler: Option<Handler>,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl CommandDescriptor {
    /// Declares a command without a handler.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterMap::new(),
            handler: None,
        }
    }

    /// Sets the handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Declares a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, def: ParameterDef) -> Self {
        self.parameters.insert(name.into(), def);
        self
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared parameters.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Handler, if one was set.
    #[must_use]
    pub const fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Checks the descriptor in isolation.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.is_empty() {
            return Err(RegistrationError::EmptyCommandName);
        }
        if self.description.is_empty() {
            return Err(RegistrationError::EmptyDescription {
                command: self.name.clone(),
            });
        }
        check_parameters(&self.parameters).map_err(|source| {
            RegistrationError::InvalidParameter {
                command: self.name.clone(),
                source,
            }
        })?;
        if self.handler.is_none() {
            return Err(RegistrationError::MissingHandler {
                command: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Registry of commands keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command.
    ///
    /// # Errors
    ///
    /// Returns an error when the descriptor is invalid or its name is already
    /// registered. The registry is unchanged on error.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistrationError> {
        descriptor.validate()?;
        if self.commands.contains_key(descriptor.name()) {
            return Err(RegistrationError::DuplicateCommand {
                command: descriptor.name,
            });
        }
        self.commands.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Looks up a command by exact name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Command catalogue keyed by name, as published by `health`.
    #[must_use]
    pub const fn catalog(&self) -> &BTreeMap<String, CommandDescriptor> {
        &self.commands
    }

    /// Registered command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
