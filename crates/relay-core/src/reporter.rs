//! Structured reporting for dispatch lifecycle events.

use std::sync::Arc;

use crate::dispatch::{DispatchError, Rejection, ResolverKind};
use crate::envelope::Envelope;
use crate::platform::PlatformError;
use crate::response::Response;

/// Tracing target for dispatch lifecycle events.
pub(crate) const REPORTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reporter");

/// Observer trait used to surface dispatch events to telemetry sinks.
pub trait DispatchReporter: Send + Sync {
    /// Invoked once an envelope has been decoded and a resolver selected.
    fn call_started(&self, envelope: &Envelope, resolver: ResolverKind);

    /// Invoked when a call is refused at the transport boundary.
    fn call_rejected(&self, rejection: &Rejection);

    /// Invoked when processing stops with an error.
    fn call_failed(&self, message_id: &str, error: &DispatchError);

    /// Invoked after the handler returned.
    fn call_completed(&self, message_id: &str, response: &Response);

    /// Invoked when a best-effort platform operation fails.
    fn infrastructure_failed(&self, operation: &str, error: &PlatformError);
}

impl<T> DispatchReporter for Arc<T>
where
    T: DispatchReporter + ?Sized,
{
    fn call_started(&self, envelope: &Envelope, resolver: ResolverKind) {
        (**self).call_started(envelope, resolver);
    }

    fn call_rejected(&self, rejection: &Rejection) {
        (**self).call_rejected(rejection);
    }

    fn call_failed(&self, message_id: &str, error: &DispatchError) {
        (**self).call_failed(message_id, error);
    }

    fn call_completed(&self, message_id: &str, response: &Response) {
        (**self).call_completed(message_id, response);
    }

    fn infrastructure_failed(&self, operation: &str, error: &PlatformError) {
        (**self).infrastructure_failed(operation, error);
    }
}

/// Default reporter that records dispatch events using `tracing`.
///
/// Payloads are only logged when `trace_comms` is enabled. Credentials are
/// never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredDispatchReporter {
    trace_comms: bool,
}

impl StructuredDispatchReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new(trace_comms: bool) -> Self {
        Self { trace_comms }
    }
}

impl DispatchReporter for StructuredDispatchReporter {
    fn call_started(&self, envelope: &Envelope, resolver: ResolverKind) {
        if self.trace_comms {
            tracing::debug!(
                target: REPORTER_TARGET,
                event = "call_started",
                message_id = %envelope.message_id,
                event_type = %envelope.event_type,
                org_id = %envelope.org_id,
                resolver = resolver.as_str(),
                data = %serde_json::Value::Object(envelope.data.clone()),
                "processing call"
            );
        } else {
            tracing::debug!(
                target: REPORTER_TARGET,
                event = "call_started",
                message_id = %envelope.message_id,
                event_type = %envelope.event_type,
                org_id = %envelope.org_id,
                resolver = resolver.as_str(),
                "processing call"
            );
        }
    }

    fn call_rejected(&self, rejection: &Rejection) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "call_rejected",
            status = rejection.status_code(),
            reason = %rejection,
            "call rejected"
        );
    }

    fn call_failed(&self, message_id: &str, error: &DispatchError) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "call_failed",
            message_id,
            retriable = error.is_retriable(),
            error = %error,
            "call failed"
        );
    }

    fn call_completed(&self, message_id: &str, response: &Response) {
        tracing::debug!(
            target: REPORTER_TARGET,
            event = "call_completed",
            message_id,
            success = response.is_success(),
            error = response.error().unwrap_or_default(),
            "call completed"
        );
    }

    fn infrastructure_failed(&self, operation: &str, error: &PlatformError) {
        tracing::error!(
            target: REPORTER_TARGET,
            event = "infrastructure_failed",
            operation,
            error = %error,
            "platform operation failed"
        );
    }
}
