//! Signed webhook dispatch.
//!
//! This module turns one signed HTTP body into one [`Response`]. The
//! transport hands over the raw body and the `lc-svc-sig` header; everything
//! after that is transport independent.
//!
//! ## Pipeline
//!
//! 1. The HMAC signature is verified over the exact bytes received. Failures
//!    are rejected before any parsing.
//! 2. The body is decoded into an [`Envelope`], then the protocol version and
//!    deadline are checked.
//! 3. The event type selects a resolver: `command` events go through the
//!    command registry, everything else through the callback table.
//! 4. Arguments are validated, the handler is resolved, an organisation
//!    capability is attached when credentials are present, and the resolver
//!    pre-hook runs.
//! 5. The handler is invoked and its response returned unchanged.
//!
//! Every failure after authentication is folded into a failed response, so
//! the transport always answers authenticated calls with HTTP 200.

mod builder;
mod errors;
mod health;
mod resolver;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

pub use self::builder::ServiceBuilder;
pub use self::errors::{DispatchError, Outcome, Rejection};
use self::health::HealthSnapshot;
pub use self::resolver::{COMMAND_EVENT_TYPE, Resolver, ResolverKind};
use self::resolver::{CommandResolver, RequestResolver, command_name};
use crate::callbacks::CallbackTable;
use crate::command::{CommandDescriptor, CommandRegistry};
use crate::envelope::Envelope;
use crate::platform::{OrgConnector, OrgHandle};
use crate::registration::RegistrationError;
use crate::reporter::DispatchReporter;
use crate::request::Request;
use crate::response::Response;
use crate::schema::ParameterMap;
use crate::signature;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Stateless request router for one service.
///
/// The dispatcher is immutable after [`ServiceBuilder::build`] except for
/// the command registry, which accepts late registrations, and the in-flight
/// counter. It is safe to share between threads.
pub struct Dispatcher {
    service_name: String,
    secret: Vec<u8>,
    callbacks: CallbackTable,
    commands: RwLock<Arc<CommandRegistry>>,
    request_parameters: ParameterMap,
    subscriptions: Vec<String>,
    connector: Option<Arc<dyn OrgConnector>>,
    reporter: Arc<dyn DispatchReporter>,
    started_at: OffsetDateTime,
    in_flight: AtomicU32,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("service_name", &self.service_name)
            .field("callbacks", &self.callbacks)
            .field("subscriptions", &self.subscriptions)
            .field("started_at", &self.started_at)
            .field("calls_in_progress", &self.calls_in_progress())
            .finish_non_exhaustive()
    }
}

/// Keeps the in-flight counter raised for the lifetime of one call.
struct InFlightGuard<'a> {
    counter: &'a AtomicU32,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Dispatcher {
    /// Authenticates and processes one raw webhook body.
    ///
    /// `signature` is the value of the `lc-svc-sig` header.
    #[must_use]
    pub fn dispatch(&self, raw_body: &[u8], signature: &str) -> Outcome {
        if !signature::verify(raw_body, signature, &self.secret) {
            return self.reject(Rejection::Unauthenticated);
        }
        let _guard = InFlightGuard::enter(&self.in_flight);

        let value: Value = match serde_json::from_slice(raw_body) {
            Ok(value) => value,
            Err(error) => {
                return self.reject(Rejection::MalformedBody {
                    message: error.to_string(),
                });
            }
        };
        let response = match Envelope::decode(value) {
            Ok(envelope) => self.process(&envelope),
            Err(error) => {
                let error = DispatchError::from(error);
                self.reporter.call_failed("", &error);
                error.into_response()
            }
        };
        Outcome::Handled(response)
    }

    /// Processes an envelope that was already authenticated and decoded.
    #[must_use]
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> Response {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.process(envelope)
    }

    /// Registers a command after construction.
    ///
    /// In-flight calls keep the registry they started with.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid or duplicate descriptor, in which case
    /// the registry is unchanged.
    pub fn register_command(&self, descriptor: CommandDescriptor) -> Result<(), RegistrationError> {
        let mut guard = self
            .commands
            .write()
            .map_err(|_| RegistrationError::RegistryPoisoned)?;
        let mut next = CommandRegistry::clone(&**guard);
        next.register(descriptor)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Number of calls currently being processed.
    #[must_use]
    pub fn calls_in_progress(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Shared secret used to verify signatures.
    #[must_use]
    pub fn secret_key(&self) -> &[u8] {
        &self.secret
    }

    /// Service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// External event subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Snapshot of the command registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::RegistryPoisoned`] when a writer panicked.
    pub fn commands(&self) -> Result<Arc<CommandRegistry>, RegistrationError> {
        self.commands
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| RegistrationError::RegistryPoisoned)
    }

    fn reject(&self, rejection: Rejection) -> Outcome {
        self.reporter.call_rejected(&rejection);
        Outcome::Rejected(rejection)
    }

    fn process(&self, envelope: &Envelope) -> Response {
        match self.try_process(envelope) {
            Ok(response) => {
                self.reporter.call_completed(&envelope.message_id, &response);
                response
            }
            Err(error) => {
                self.reporter.call_failed(&envelope.message_id, &error);
                error.into_response()
            }
        }
    }

    fn try_process(&self, envelope: &Envelope) -> Result<Response, DispatchError> {
        let kind = ResolverKind::for_event_type(&envelope.event_type);
        self.reporter.call_started(envelope, kind);

        envelope.check_version()?;
        envelope.check_deadline(OffsetDateTime::now_utc())?;

        let commands = self
            .commands()
            .map_err(|error| DispatchError::internal(error.to_string()))?;
        match kind {
            ResolverKind::Command => self.invoke(&CommandResolver::new(commands), envelope),
            ResolverKind::Request => {
                let health = HealthSnapshot {
                    started_at: self.started_at,
                    calls_in_progress: self.calls_in_progress(),
                    subscriptions: &self.subscriptions,
                    callbacks: &self.callbacks,
                    request_parameters: &self.request_parameters,
                    commands: &commands,
                };
                let resolver = RequestResolver::new(&self.callbacks, &self.request_parameters, health);
                self.invoke(&resolver, envelope)
            }
        }
    }

    fn invoke(&self, resolver: &dyn Resolver, envelope: &Envelope) -> Result<Response, DispatchError> {
        let mut request = Request::from_envelope(envelope);
        request.event.data = resolver.parse_arguments(&request.event)?;

        let Some(handler) = resolver.resolve_handler(&request.event) else {
            let command = match resolver.kind() {
                ResolverKind::Command => command_name(&request.event).map(str::to_owned),
                ResolverKind::Request => None,
            };
            return Err(DispatchError::not_implemented(request.event.kind, command));
        };

        if let Some(org) = self.connect(envelope)? {
            request = request.with_org(org);
        }
        resolver.pre_invocation(&request)?;

        debug!(
            target: DISPATCH_TARGET,
            event_type = %request.event.kind,
            resolver = resolver.kind().as_str(),
            "invoking handler"
        );
        Ok(handler(&request))
    }

    fn connect(&self, envelope: &Envelope) -> Result<Option<Arc<dyn OrgHandle>>, DispatchError> {
        if envelope.org_id.is_empty() || envelope.auth_token.is_empty() {
            return Ok(None);
        }
        let Some(connector) = &self.connector else {
            debug!(target: DISPATCH_TARGET, "no connector configured, calling without capability");
            return Ok(None);
        };
        connector
            .connect(&envelope.org_id, &envelope.auth_token)
            .map(Some)
            .map_err(|source| DispatchError::platform("connect", source))
    }
}
