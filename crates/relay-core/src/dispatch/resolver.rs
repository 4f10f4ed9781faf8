//! Handler resolution strategies.
//!
//! The inbound event type selects one of two strategies: `command` events are
//! resolved through the command registry by their `command_name` field, every
//! other event type is looked up in the callback table.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::health::HealthSnapshot;
use crate::callbacks::{CallbackTable, Handler, RequestKind, handler};
use crate::command::CommandRegistry;
use crate::envelope::Dict;
use crate::platform::MessageKind;
use crate::request::{COMMAND_NAME_KEY, Request, RequestEvent};
use crate::schema::{ParameterMap, validate_all};

/// Event type routed to the command registry.
pub const COMMAND_EVENT_TYPE: &str = "command";

/// Available resolution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Callback table lookup keyed by event type.
    Request,
    /// Command registry lookup keyed by `command_name`.
    Command,
}

impl ResolverKind {
    /// Selects the strategy for an event type.
    #[must_use]
    pub fn for_event_type(event_type: &str) -> Self {
        if event_type == COMMAND_EVENT_TYPE {
            Self::Command
        } else {
            Self::Request
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Command => "command",
        }
    }
}

/// Strategy used by the dispatcher to turn an event into a handler call.
pub trait Resolver {
    /// Strategy identifier.
    fn kind(&self) -> ResolverKind;

    /// Produces the payload handed to the handler, validating it if the
    /// strategy declares a schema for it.
    fn parse_arguments(&self, event: &RequestEvent) -> Result<Dict, DispatchError>;

    /// Looks up the handler for the event.
    fn resolve_handler(&self, event: &RequestEvent) -> Option<Handler>;

    /// Runs just before the handler is invoked.
    fn pre_invocation(&self, request: &Request) -> Result<(), DispatchError>;
}

/// Resolves request events through the callback table.
pub(crate) struct RequestResolver<'a> {
    callbacks: &'a CallbackTable,
    request_parameters: &'a ParameterMap,
    health: HealthSnapshot<'a>,
}

impl<'a> RequestResolver<'a> {
    pub(crate) const fn new(
        callbacks: &'a CallbackTable,
        request_parameters: &'a ParameterMap,
        health: HealthSnapshot<'a>,
    ) -> Self {
        Self {
            callbacks,
            request_parameters,
            health,
        }
    }
}

impl Resolver for RequestResolver<'_> {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Request
    }

    fn parse_arguments(&self, event: &RequestEvent) -> Result<Dict, DispatchError> {
        if event.kind == RequestKind::Request.as_str() {
            validate_all(self.request_parameters, &event.data)?;
        }
        Ok(event.data.clone())
    }

    fn resolve_handler(&self, event: &RequestEvent) -> Option<Handler> {
        let kind = RequestKind::parse(&event.kind)?;
        if kind == RequestKind::Health {
            let response = self.health.response();
            return Some(handler(move |_| response.clone()));
        }
        let resolved = self.callbacks.get(kind).cloned();
        if resolved.is_none() {
            debug!(target: DISPATCH_TARGET, event_type = %event.kind, "no callback registered");
        }
        resolved
    }

    fn pre_invocation(&self, _request: &Request) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Resolves command events through the command registry.
pub(crate) struct CommandResolver {
    registry: Arc<CommandRegistry>,
}

impl CommandResolver {
    pub(crate) const fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }
}

pub(crate) fn command_name(event: &RequestEvent) -> Option<&str> {
    event.data.get(COMMAND_NAME_KEY).and_then(|value| value.as_str())
}

impl Resolver for CommandResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Command
    }

    fn parse_arguments(&self, event: &RequestEvent) -> Result<Dict, DispatchError> {
        if let Some(command) = command_name(event).and_then(|name| self.registry.resolve(name)) {
            validate_all(command.parameters(), &event.data)?;
        }
        Ok(event.data.clone())
    }

    fn resolve_handler(&self, event: &RequestEvent) -> Option<Handler> {
        let Some(name) = command_name(event) else {
            debug!(target: DISPATCH_TARGET, "command_name not found in data");
            return None;
        };
        debug!(target: DISPATCH_TARGET, command = name, "looking up command handler");
        let resolved = self
            .registry
            .resolve(name)
            .and_then(|command| command.handler())
            .cloned();
        if resolved.is_none() {
            debug!(target: DISPATCH_TARGET, command = name, "no handler found");
        }
        resolved
    }

    fn pre_invocation(&self, request: &Request) -> Result<(), DispatchError> {
        let Some(org) = &request.org else {
            debug!(target: DISPATCH_TARGET, "no platform capability, skipping command ack");
            return Ok(());
        };
        let room_id = request.room_id()?;
        let command_id = request.command_id()?;
        let mut content = Dict::new();
        content.insert(String::from("cid"), Value::from(command_id));
        org.post_message(room_id, MessageKind::CommandAck, &content)
            .map_err(|source| DispatchError::platform("command ack", source))
    }
}
