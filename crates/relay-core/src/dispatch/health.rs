//! Built-in `health` introspection handler.
//!
//! External tooling reads this payload to discover what a service accepts, so
//! its shape is part of the wire contract.

use serde_json::json;
use time::OffsetDateTime;

use crate::callbacks::CallbackTable;
use crate::command::CommandRegistry;
use crate::envelope::SUPPORTED_VERSION;
use crate::response::Response;
use crate::schema::ParameterMap;

/// Point-in-time view of the dispatcher used to answer `health`.
pub(crate) struct HealthSnapshot<'a> {
    pub(crate) started_at: OffsetDateTime,
    pub(crate) calls_in_progress: u32,
    pub(crate) subscriptions: &'a [String],
    pub(crate) callbacks: &'a CallbackTable,
    pub(crate) request_parameters: &'a ParameterMap,
    pub(crate) commands: &'a CommandRegistry,
}

impl HealthSnapshot<'_> {
    pub(crate) fn response(&self) -> Response {
        Response::ok()
            .with_data("version", SUPPORTED_VERSION)
            .with_data("start_time", self.started_at.unix_timestamp())
            .with_data("calls_in_progress", self.calls_in_progress)
            .with_data(
                "mtd",
                json!({
                    "detect_subscriptions": self.subscriptions,
                    "callbacks": self.callbacks.names(),
                    "request_params": self.request_parameters,
                    "commands": self.commands.catalog(),
                }),
            )
    }
}
