//! Interactive continuation overlay.
//!
//! The overlay lets a handler start asynchronous work on the platform and
//! resume in a named callback when the result comes back as a `detection`
//! event. The service stays stateless: everything needed to resume travels
//! in a [`ContinuationToken`] embedded in the correlation string.
//!
//! The overlay wraps the service's own `detection`, `org_install`,
//! `org_per_1h` and `org_uninstall` callbacks:
//!
//! - `detection` events carrying a token for this service are routed to the
//!   matching interactive callback. Anything else, including events the
//!   overlay cannot interpret, falls through to the original callback.
//! - `org_install` and `org_per_1h` push the interactive rule before chaining.
//! - `org_uninstall` deletes the rule before chaining.
//!
//! Rule maintenance failures are reported and never stop the chained
//! callback.

mod request;
mod token;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use self::request::{ContextError, InteractiveRequest};
pub use self::token::{CallbackId, ContinuationToken, Namespace, TokenError};
use crate::callbacks::{Handler, RequestKind, handler};
use crate::command::CommandDescriptor;
use crate::dispatch::{Dispatcher, Outcome, ServiceBuilder};
use crate::envelope::{Dict, Envelope, null_as_empty};
use crate::job::Job;
use crate::platform::{OrgHandle, PlatformError};
use crate::registration::RegistrationError;
use crate::reporter::DispatchReporter;
use crate::request::Request;
use crate::response::Response;

const INTERACTIVE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::interactive");

/// Callable resumed through the continuation protocol.
pub type InteractiveCallback = Arc<dyn Fn(&InteractiveRequest) -> Response + Send + Sync>;

/// Wraps a closure as an [`InteractiveCallback`].
pub fn interactive<F>(callback: F) -> InteractiveCallback
where
    F: Fn(&InteractiveRequest) -> Response + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// State carried by a tracked tasking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedTaskingOptions {
    /// Context handed back to the callback.
    pub context: Dict,
    /// Job to resume.
    pub job_id: Option<String>,
    /// Session to resume.
    pub session_id: Option<String>,
}

/// Errors raised when starting a continuation.
#[derive(Debug, Error)]
pub enum InteractiveError {
    /// The callback name was never registered.
    #[error("interactive callback '{name}' is not registered")]
    UnregisteredCallback {
        /// Callback name.
        name: String,
    },
    /// The token could not be encoded.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// The platform refused the tasking.
    #[error("tracked tasking failed: {0}")]
    Platform(#[from] PlatformError),
    /// The callback table lock was poisoned.
    #[error("interactive callback table lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default, Deserialize)]
struct Routing {
    #[serde(default, deserialize_with = "null_as_default")]
    investigation_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    sid: String,
}

#[derive(Debug, Deserialize)]
struct InboundDetection {
    #[serde(default, deserialize_with = "null_as_empty")]
    detect: Dict,
    #[serde(default, deserialize_with = "null_as_default")]
    routing: Routing,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy)]
enum RuleStep {
    Apply,
    Remove,
}

impl RuleStep {
    const fn operation(self) -> &'static str {
        match self {
            Self::Apply => "apply interactive rule",
            Self::Remove => "remove interactive rule",
        }
    }
}

struct RegisteredCallback {
    name: String,
    callback: InteractiveCallback,
}

/// State shared between the overlay handlers and the service facade.
struct Overlay {
    namespace: Namespace,
    secret: Vec<u8>,
    callbacks: RwLock<BTreeMap<CallbackId, RegisteredCallback>>,
    reporter: Arc<dyn DispatchReporter>,
    detection: Option<Handler>,
    org_install: Option<Handler>,
    org_per_1h: Option<Handler>,
    org_uninstall: Option<Handler>,
}

impl Overlay {
    fn register(
        &self,
        name: &str,
        callback: InteractiveCallback,
    ) -> Result<CallbackId, RegistrationError> {
        if name.is_empty() {
            return Err(RegistrationError::EmptyCallbackName);
        }
        let id = CallbackId::derive(&self.secret, name);
        let mut callbacks = self
            .callbacks
            .write()
            .map_err(|_| RegistrationError::RegistryPoisoned)?;
        if let Some(existing) = callbacks.get(&id) {
            if existing.name != name {
                warn!(
                    target: INTERACTIVE_TARGET,
                    callback = name,
                    existing = %existing.name,
                    id = %id,
                    "callback id collision, keeping the first registration"
                );
            }
            return Ok(id);
        }
        callbacks.insert(
            id.clone(),
            RegisteredCallback {
                name: name.to_owned(),
                callback,
            },
        );
        Ok(id)
    }

    fn continuation(
        &self,
        name: &str,
        options: &TrackedTaskingOptions,
    ) -> Result<String, InteractiveError> {
        let id = CallbackId::derive(&self.secret, name);
        let registered = self
            .callbacks
            .read()
            .map_err(|_| InteractiveError::Poisoned)?
            .contains_key(&id);
        if !registered {
            return Err(InteractiveError::UnregisteredCallback {
                name: name.to_owned(),
            });
        }
        let token = ContinuationToken {
            callback_id: id,
            job_id: options.job_id.clone(),
            session_id: options.session_id.clone(),
            context: options.context.clone(),
        };
        Ok(self.namespace.correlation(&token)?)
    }

    fn lookup(&self, id: &CallbackId) -> Option<InteractiveCallback> {
        let Ok(callbacks) = self.callbacks.read() else {
            warn!(target: INTERACTIVE_TARGET, "interactive callback table lock poisoned");
            return None;
        };
        callbacks
            .get(id)
            .map(|registered| Arc::clone(&registered.callback))
    }

    fn on_detection(&self, request: &Request) -> Response {
        let Some((detection, token)) = self.decode(request) else {
            return self.fall_through(request);
        };
        if token.callback_id.is_empty() {
            warn!(
                target: INTERACTIVE_TARGET,
                investigation_id = %detection.routing.investigation_id,
                "continuation token without callback id"
            );
            return self.fall_through(request);
        }
        let Some(callback) = self.lookup(&token.callback_id) else {
            warn!(
                target: INTERACTIVE_TARGET,
                investigation_id = %detection.routing.investigation_id,
                "continuation token with unknown callback id"
            );
            return self.fall_through(request);
        };

        debug!(
            target: INTERACTIVE_TARGET,
            callback = %token.callback_id,
            "resuming interactive callback"
        );
        let interactive_request = InteractiveRequest {
            org: request.org.clone(),
            org_id: request.org_id.clone(),
            sensor_id: detection.routing.sid,
            event: detection.detect,
            job: token.job_id.filter(|id| !id.is_empty()).map(Job::resume),
            context: token.context,
            session_id: token.session_id.filter(|id| !id.is_empty()),
            service_request: request.clone(),
        };
        callback(&interactive_request)
    }

    fn decode(&self, request: &Request) -> Option<(InboundDetection, ContinuationToken)> {
        let detection: InboundDetection =
            match serde_json::from_value(Value::Object(request.event.data.clone())) {
                Ok(detection) => detection,
                Err(error) => {
                    debug!(target: INTERACTIVE_TARGET, %error, "detection has no routing block");
                    return None;
                }
            };
        let token = self.namespace.parse(&detection.routing.investigation_id)?;
        Some((detection, token))
    }

    fn fall_through(&self, request: &Request) -> Response {
        chain(self.detection.as_ref(), request)
    }

    fn on_lifecycle(
        &self,
        request: &Request,
        step: RuleStep,
        original: Option<&Handler>,
    ) -> Response {
        match &request.org {
            Some(org) => {
                let result = match step {
                    RuleStep::Apply => self.apply_rule(org.as_ref()),
                    RuleStep::Remove => self.remove_rule(org.as_ref()),
                };
                if let Err(error) = result {
                    self.reporter.infrastructure_failed(step.operation(), &error);
                }
            }
            None => debug!(
                target: INTERACTIVE_TARGET,
                operation = step.operation(),
                "no platform capability, skipping rule maintenance"
            ),
        }
        chain(original, request)
    }

    fn apply_rule(&self, org: &dyn OrgHandle) -> Result<(), PlatformError> {
        org.sync_rules(&self.namespace.rule())
    }

    fn remove_rule(&self, org: &dyn OrgHandle) -> Result<(), PlatformError> {
        org.delete_rule(self.namespace.as_str())
    }
}

fn chain(original: Option<&Handler>, request: &Request) -> Response {
    original.map_or_else(Response::not_implemented, |callback| callback(request))
}

/// Builds an [`InteractiveService`] on top of a [`ServiceBuilder`].
pub struct InteractiveServiceBuilder {
    service: ServiceBuilder,
    callbacks: Vec<(String, InteractiveCallback)>,
}

impl fmt::Debug for InteractiveServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.callbacks.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("InteractiveServiceBuilder")
            .field("service", &self.service)
            .field("callbacks", &names)
            .finish()
    }
}

impl InteractiveServiceBuilder {
    /// Wraps a service descriptor.
    #[must_use]
    pub const fn new(service: ServiceBuilder) -> Self {
        Self {
            service,
            callbacks: Vec::new(),
        }
    }

    /// Registers an interactive callback under `name`.
    #[must_use]
    pub fn callback(mut self, name: impl Into<String>, callback: InteractiveCallback) -> Self {
        self.callbacks.push((name.into(), callback));
        self
    }

    /// Installs the overlay and builds the service.
    ///
    /// # Errors
    ///
    /// Returns an error when the service name cannot form a namespace, an
    /// interactive callback name is empty, or the wrapped descriptor fails
    /// to build.
    pub fn build(self) -> Result<InteractiveService, RegistrationError> {
        let mut service = self.service;
        let namespace = Namespace::for_service(service.name())?;
        let subscription = namespace.subscription();
        let overlay = Arc::new(Overlay {
            namespace,
            secret: service.secret().to_vec(),
            callbacks: RwLock::default(),
            reporter: service.shared_reporter(),
            detection: service.take_callback(RequestKind::Detection),
            org_install: service.take_callback(RequestKind::OrgInstall),
            org_per_1h: service.take_callback(RequestKind::OrgPer1h),
            org_uninstall: service.take_callback(RequestKind::OrgUninstall),
        });
        for (name, callback) in self.callbacks {
            overlay.register(&name, callback)?;
        }

        let dispatcher = service
            .on(RequestKind::Detection, {
                let overlay = Arc::clone(&overlay);
                handler(move |request| overlay.on_detection(request))
            })
            .on(RequestKind::OrgInstall, {
                let overlay = Arc::clone(&overlay);
                handler(move |request| {
                    overlay.on_lifecycle(request, RuleStep::Apply, overlay.org_install.as_ref())
                })
            })
            .on(RequestKind::OrgPer1h, {
                let overlay = Arc::clone(&overlay);
                handler(move |request| {
                    overlay.on_lifecycle(request, RuleStep::Apply, overlay.org_per_1h.as_ref())
                })
            })
            .on(RequestKind::OrgUninstall, {
                let overlay = Arc::clone(&overlay);
                handler(move |request| {
                    overlay.on_lifecycle(request, RuleStep::Remove, overlay.org_uninstall.as_ref())
                })
            })
            .subscribe(subscription)
            .build()?;

        Ok(InteractiveService {
            dispatcher,
            overlay,
        })
    }
}

/// Service with the interactive overlay installed.
pub struct InteractiveService {
    dispatcher: Dispatcher,
    overlay: Arc<Overlay>,
}

impl fmt::Debug for InteractiveService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveService")
            .field("dispatcher", &self.dispatcher)
            .field("namespace", &self.overlay.namespace)
            .finish_non_exhaustive()
    }
}

impl InteractiveService {
    /// Authenticates and processes one raw webhook body.
    #[must_use]
    pub fn dispatch(&self, raw_body: &[u8], signature: &str) -> Outcome {
        self.dispatcher.dispatch(raw_body, signature)
    }

    /// Processes an envelope that was already authenticated and decoded.
    #[must_use]
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> Response {
        self.dispatcher.dispatch_envelope(envelope)
    }

    /// Registers an interactive callback after construction.
    ///
    /// Registering a name twice keeps the first callback. When two names
    /// derive the same identifier, the first registration wins.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name.
    pub fn register_interactive(
        &self,
        name: &str,
        callback: InteractiveCallback,
    ) -> Result<CallbackId, RegistrationError> {
        self.overlay.register(name, callback)
    }

    /// Registers a command and, optionally, the interactive callback it
    /// continues into.
    ///
    /// # Errors
    ///
    /// Returns an error when the command or the callback cannot be
    /// registered. The callback is not registered if the command fails.
    pub fn register_command(
        &self,
        descriptor: CommandDescriptor,
        interactive: Option<(&str, InteractiveCallback)>,
    ) -> Result<(), RegistrationError> {
        self.dispatcher.register_command(descriptor)?;
        if let Some((name, callback)) = interactive {
            self.overlay.register(name, callback)?;
        }
        Ok(())
    }

    /// Builds the correlation string that resumes `callback_name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the callback is not registered or the token
    /// cannot be encoded.
    pub fn continuation_for(
        &self,
        callback_name: &str,
        options: &TrackedTaskingOptions,
    ) -> Result<String, InteractiveError> {
        self.overlay.continuation(callback_name, options)
    }

    /// Tasks a sensor so that its results resume `callback_name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the callback is not registered or the platform
    /// rejects the tasking.
    pub fn tracked_tasking(
        &self,
        org: &dyn OrgHandle,
        sensor_id: &str,
        task: &str,
        callback_name: &str,
        options: &TrackedTaskingOptions,
    ) -> Result<(), InteractiveError> {
        let correlation = self.overlay.continuation(callback_name, options)?;
        debug!(
            target: INTERACTIVE_TARGET,
            sensor_id,
            callback = callback_name,
            "tasking sensor with continuation"
        );
        org.task_sensor(sensor_id, task, &correlation)?;
        Ok(())
    }

    /// Pushes the interactive rule, replacing any previous copy.
    ///
    /// # Errors
    ///
    /// Returns the platform error unchanged.
    pub fn apply_rule(&self, org: &dyn OrgHandle) -> Result<(), PlatformError> {
        self.overlay.apply_rule(org)
    }

    /// Deletes the interactive rule.
    ///
    /// # Errors
    ///
    /// Returns the platform error unchanged.
    pub fn remove_rule(&self, org: &dyn OrgHandle) -> Result<(), PlatformError> {
        self.overlay.remove_rule(org)
    }

    /// Correlation namespace of the service.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.overlay.namespace
    }

    /// Underlying dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
