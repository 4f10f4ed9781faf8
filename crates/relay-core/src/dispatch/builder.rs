//! Declarative assembly of a [`Dispatcher`].

use std::fmt;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, RwLock};

use relay_config::Config;
use time::OffsetDateTime;

use super::Dispatcher;
use crate::callbacks::{CallbackTable, Handler, RequestKind};
use crate::command::{CommandDescriptor, CommandRegistry};
use crate::platform::OrgConnector;
use crate::registration::RegistrationError;
use crate::reporter::{DispatchReporter, StructuredDispatchReporter};
use crate::schema::{ParameterDef, ParameterMap, check_parameters};

/// Collects the service descriptor and produces an immutable dispatcher.
///
/// Nothing is validated until [`ServiceBuilder::build`], which reports the
/// first invalid declaration.
pub struct ServiceBuilder {
    name: String,
    secret: Vec<u8>,
    callbacks: Vec<(RequestKind, Handler)>,
    commands: Vec<CommandDescriptor>,
    request_parameters: ParameterMap,
    subscriptions: Vec<String>,
    connector: Option<Arc<dyn OrgConnector>>,
    reporter: Option<Arc<dyn DispatchReporter>>,
    trace_comms: bool,
}

impl fmt::Debug for ServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBuilder")
            .field("name", &self.name)
            .field("callbacks", &self.callbacks.len())
            .field("commands", &self.commands.len())
            .field("request_parameters", &self.request_parameters)
            .field("subscriptions", &self.subscriptions)
            .field("connector", &self.connector.is_some())
            .field("trace_comms", &self.trace_comms)
            .finish_non_exhaustive()
    }
}

impl ServiceBuilder {
    /// Starts a descriptor for the service `name` signed with `secret`.
    pub fn new(name: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            callbacks: Vec::new(),
            commands: Vec::new(),
            request_parameters: ParameterMap::new(),
            subscriptions: Vec::new(),
            connector: None,
            reporter: None,
            trace_comms: false,
        }
    }

    /// Starts a descriptor from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new(config.service_name(), config.secret_key());
        builder.trace_comms = config.trace_comms();
        builder
    }

    /// Registers the callback for `kind`.
    #[must_use]
    pub fn on(mut self, kind: RequestKind, handler: Handler) -> Self {
        self.callbacks.push((kind, handler));
        self
    }

    /// Registers a command.
    #[must_use]
    pub fn command(mut self, descriptor: CommandDescriptor) -> Self {
        self.commands.push(descriptor);
        self
    }

    /// Declares a parameter accepted by the `request` callback.
    #[must_use]
    pub fn request_parameter(mut self, name: impl Into<String>, def: ParameterDef) -> Self {
        self.request_parameters.insert(name.into(), def);
        self
    }

    /// Declares every parameter accepted by the `request` callback.
    #[must_use]
    pub fn request_parameters(mut self, params: ParameterMap) -> Self {
        self.request_parameters.extend(params);
        self
    }

    /// Subscribes to an external event name.
    #[must_use]
    pub fn subscribe(mut self, event: impl Into<String>) -> Self {
        self.subscriptions.push(event.into());
        self
    }

    /// Sets the factory used to obtain organisation capabilities.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn OrgConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Overrides the lifecycle reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn DispatchReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Enables payload logging in the default reporter.
    #[must_use]
    pub const fn trace_comms(mut self, enabled: bool) -> Self {
        self.trace_comms = enabled;
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Removes the first callback registered for `kind`.
    pub(crate) fn take_callback(&mut self, kind: RequestKind) -> Option<Handler> {
        let index = self
            .callbacks
            .iter()
            .position(|(registered, _)| *registered == kind)?;
        Some(self.callbacks.remove(index).1)
    }

    /// Returns the reporter the dispatcher will use, materialising the default.
    pub(crate) fn shared_reporter(&mut self) -> Arc<dyn DispatchReporter> {
        if let Some(reporter) = &self.reporter {
            return Arc::clone(reporter);
        }
        let reporter: Arc<dyn DispatchReporter> =
            Arc::new(StructuredDispatchReporter::new(self.trace_comms));
        self.reporter = Some(Arc::clone(&reporter));
        reporter
    }

    /// Validates the descriptor and builds the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns the first invalid declaration: an empty service name or
    /// secret, a malformed request parameter, a reserved or duplicate
    /// callback, or an invalid or duplicate command.
    pub fn build(mut self) -> Result<Dispatcher, RegistrationError> {
        if self.name.is_empty() {
            return Err(RegistrationError::InvalidServiceName { name: self.name });
        }
        if self.secret.is_empty() {
            return Err(RegistrationError::EmptySecretKey);
        }
        check_parameters(&self.request_parameters)
            .map_err(|source| RegistrationError::InvalidRequestParameter { source })?;

        let mut callbacks = CallbackTable::new();
        for (kind, handler) in self.callbacks.drain(..) {
            callbacks.insert(kind, handler)?;
        }
        let mut commands = CommandRegistry::new();
        for descriptor in self.commands.drain(..) {
            commands.register(descriptor)?;
        }
        let reporter = self.shared_reporter();

        Ok(Dispatcher {
            service_name: self.name,
            secret: self.secret,
            callbacks,
            commands: RwLock::new(Arc::new(commands)),
            request_parameters: self.request_parameters,
            subscriptions: self.subscriptions,
            connector: self.connector,
            reporter,
            started_at: OffsetDateTime::now_utc(),
            in_flight: AtomicU32::new(0),
        })
    }
}
