//! Test doubles for platform capabilities and lifecycle reporting.

use std::sync::{Arc, Mutex};

use mockall::mock;
use serde_json::{Value, json};

use crate::dispatch::{DispatchError, Rejection, ResolverKind};
use crate::envelope::{Dict, Envelope};
use crate::platform::{MessageKind, OrgConnector, OrgHandle, PlatformError};
use crate::reporter::DispatchReporter;
use crate::response::Response;
use crate::signature;

/// Secret shared by test services.
pub(crate) const SECRET: &[u8] = b"test-secret";

mock! {
    pub Org {}
    impl OrgHandle for Org {
        fn post_message(
            &self,
            room_id: &str,
            kind: MessageKind,
            content: &Dict,
        ) -> Result<(), PlatformError>;
        fn sync_rules(&self, rules: &Dict) -> Result<(), PlatformError>;
        fn delete_rule(&self, name: &str) -> Result<(), PlatformError>;
        fn task_sensor(
            &self,
            sensor_id: &str,
            task: &str,
            correlation: &str,
        ) -> Result<(), PlatformError>;
    }
}

/// Serialises `body` and signs it with [`SECRET`].
pub(crate) fn signed(body: &Value) -> (Vec<u8>, String) {
    let raw = serde_json::to_vec(body).expect("body serialises");
    let signature = signature::sign(&raw, SECRET).expect("secret is not empty");
    (raw, signature)
}

/// Builds a version 1 envelope body for `etype` carrying `data`.
pub(crate) fn envelope_body(etype: &str, data: Value) -> Value {
    json!({
        "version": 1,
        "mid": "msg-1",
        "etype": etype,
        "data": data,
    })
}

/// Same as [`envelope_body`], with organisation credentials.
pub(crate) fn authenticated_body(etype: &str, data: Value) -> Value {
    let mut body = envelope_body(etype, data);
    body["oid"] = json!("org-1");
    body["jwt"] = json!("token");
    body
}

/// Decodes an envelope body built by the helpers above.
pub(crate) fn envelope(body: Value) -> Envelope {
    Envelope::decode(body).expect("envelope decodes")
}

/// Connector returning the same handle for every organisation.
pub(crate) struct StaticConnector {
    handle: Arc<dyn OrgHandle>,
}

impl StaticConnector {
    pub(crate) fn new(handle: Arc<dyn OrgHandle>) -> Arc<Self> {
        Arc::new(Self { handle })
    }
}

impl OrgConnector for StaticConnector {
    fn connect(&self, _org_id: &str, _auth_token: &str) -> Result<Arc<dyn OrgHandle>, PlatformError> {
        Ok(Arc::clone(&self.handle))
    }
}

/// Connector whose every connection attempt fails.
pub(crate) struct FailingConnector;

impl OrgConnector for FailingConnector {
    fn connect(&self, org_id: &str, _auth_token: &str) -> Result<Arc<dyn OrgHandle>, PlatformError> {
        Err(PlatformError::connect(org_id, "unreachable"))
    }
}

/// Platform calls observed by [`RecordingOrg`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OrgCall {
    Post { room_id: String, kind: MessageKind, content: Dict },
    Sync(Dict),
    Delete(String),
    Task { sensor_id: String, task: String, correlation: String },
}

#[derive(Debug, Default)]
struct OrgState {
    calls: Vec<OrgCall>,
    rules: Dict,
}

/// Fake organisation that keeps a rule set and records every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingOrg {
    state: Mutex<OrgState>,
    fail_rules: bool,
}

impl RecordingOrg {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fake whose rule operations always fail.
    pub(crate) fn failing_rules() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::default(),
            fail_rules: true,
        })
    }

    pub(crate) fn calls(&self) -> Vec<OrgCall> {
        self.state.lock().expect("org state mutex poisoned").calls.clone()
    }

    pub(crate) fn rules(&self) -> Dict {
        self.state.lock().expect("org state mutex poisoned").rules.clone()
    }

    fn record(&self, call: OrgCall) {
        self.state
            .lock()
            .expect("org state mutex poisoned")
            .calls
            .push(call);
    }
}

impl OrgHandle for RecordingOrg {
    fn post_message(
        &self,
        room_id: &str,
        kind: MessageKind,
        content: &Dict,
    ) -> Result<(), PlatformError> {
        self.record(OrgCall::Post {
            room_id: room_id.to_owned(),
            kind,
            content: content.clone(),
        });
        Ok(())
    }

    fn sync_rules(&self, rules: &Dict) -> Result<(), PlatformError> {
        self.record(OrgCall::Sync(rules.clone()));
        if self.fail_rules {
            return Err(PlatformError::operation("sync rules", "denied"));
        }
        let mut state = self.state.lock().expect("org state mutex poisoned");
        for (name, rule) in rules {
            state.rules.insert(name.clone(), rule.clone());
        }
        Ok(())
    }

    fn delete_rule(&self, name: &str) -> Result<(), PlatformError> {
        self.record(OrgCall::Delete(name.to_owned()));
        if self.fail_rules {
            return Err(PlatformError::operation("delete rule", "denied"));
        }
        self.state
            .lock()
            .expect("org state mutex poisoned")
            .rules
            .remove(name);
        Ok(())
    }

    fn task_sensor(&self, sensor_id: &str, task: &str, correlation: &str) -> Result<(), PlatformError> {
        self.record(OrgCall::Task {
            sensor_id: sensor_id.to_owned(),
            task: task.to_owned(),
            correlation: correlation.to_owned(),
        });
        Ok(())
    }
}

/// Lifecycle events captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReportedEvent {
    Started { message_id: String, resolver: ResolverKind },
    Rejected(String),
    Failed { message_id: String, error: String },
    Completed { message_id: String, success: bool },
    Infrastructure { operation: String },
}

/// Reporter double recording every lifecycle event.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<ReportedEvent>>,
}

impl RecordingReporter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<ReportedEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: ReportedEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl DispatchReporter for RecordingReporter {
    fn call_started(&self, envelope: &Envelope, resolver: ResolverKind) {
        self.record(ReportedEvent::Started {
            message_id: envelope.message_id.clone(),
            resolver,
        });
    }

    fn call_rejected(&self, rejection: &Rejection) {
        self.record(ReportedEvent::Rejected(rejection.to_string()));
    }

    fn call_failed(&self, message_id: &str, error: &DispatchError) {
        self.record(ReportedEvent::Failed {
            message_id: message_id.to_owned(),
            error: error.to_string(),
        });
    }

    fn call_completed(&self, message_id: &str, response: &Response) {
        self.record(ReportedEvent::Completed {
            message_id: message_id.to_owned(),
            success: response.is_success(),
        });
    }

    fn infrastructure_failed(&self, operation: &str, _error: &PlatformError) {
        self.record(ReportedEvent::Infrastructure {
            operation: operation.to_owned(),
        });
    }
}
