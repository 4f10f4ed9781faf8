//! Dispatch core for signed webhook integration services.
//!
//! A service receives HTTP calls from the platform, each carrying a JSON
//! envelope and an HMAC signature. This crate turns one raw body and its
//! signature into one [`Response`], leaving the transport to the host
//! application. The [`Outcome`] returned by [`Dispatcher::dispatch`] tells the
//! transport which HTTP status to answer with.
//!
//! Services are declared with a [`ServiceBuilder`]: request callbacks keyed by
//! [`RequestKind`], named commands with typed parameters, external event
//! subscriptions and the connector used to reach the platform on behalf of an
//! organisation. The built [`Dispatcher`] always answers `health` with an
//! introspection payload describing that declaration.
//!
//! ## Interactive services
//!
//! [`InteractiveServiceBuilder`] layers a continuation protocol on top of a
//! service. Handlers task sensors through
//! [`InteractiveService::tracked_tasking`], and the resulting detections are
//! routed back to a named callback with the context stored in the
//! continuation token. Detections the overlay cannot interpret always reach
//! the service's own `detection` callback.
//!
//! ## Bootstrap
//!
//! [`bootstrap_with`] loads [`relay_config::Config`], validates it, installs
//! structured telemetry and returns a [`ServiceBuilder`] seeded with the
//! service name and secret.

mod bootstrap;
mod callbacks;
mod command;
mod dispatch;
pub mod envelope;
pub mod interactive;
mod job;
mod platform;
mod registration;
mod reporter;
mod request;
mod resource;
mod response;
pub mod schema;
pub mod signature;
pub mod telemetry;

pub use bootstrap::{BootstrapError, Bootstrapped, ConfigLoader, SystemConfigLoader, bootstrap_with};
pub use callbacks::{CallbackTable, Handler, RequestKind, handler};
pub use command::{CommandDescriptor, CommandRegistry};
pub use dispatch::{
    COMMAND_EVENT_TYPE, DispatchError, Dispatcher, Outcome, Rejection, Resolver, ResolverKind,
    ServiceBuilder,
};
pub use envelope::{Dict, Envelope, EnvelopeError, SUPPORTED_VERSION};
pub use interactive::{
    InteractiveCallback, InteractiveError, InteractiveRequest, InteractiveService,
    InteractiveServiceBuilder, TrackedTaskingOptions, interactive,
};
pub use job::{Attachment, Job, JobEntry, JobError};
pub use platform::{MessageKind, OrgConnector, OrgHandle, PlatformError};
pub use registration::RegistrationError;
pub use reporter::{DispatchReporter, StructuredDispatchReporter};
pub use request::{Request, RequestError, RequestEvent};
pub use resource::{RESOURCE_NOT_AVAILABLE, Resource, ResourceRequest};
pub use response::{NOT_IMPLEMENTED, Response};
pub use schema::{ParameterDef, ParameterMap, ParameterType, ValidationError, ValidationErrorKind};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
