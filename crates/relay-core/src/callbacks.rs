//! Named request callbacks.
//!
//! Request names come from a static table; there is no reflection over
//! handler slots. `health` is reserved for the dispatch core's built-in
//! introspection handler.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::registration::RegistrationError;
use crate::request::Request;
use crate::response::Response;

/// Callable invoked for a resolved request or command.
pub type Handler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(callback: F) -> Handler
where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
{
    Arc::new(callback)
}

macro_rules! request_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Request event types a service can handle.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum RequestKind {
            $(
                #[doc = concat!("The `", $name, "` request.")]
                $variant,
            )+
        }

        impl RequestKind {
            /// Every request kind, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Parses a wire event type.
            #[must_use]
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Returns the wire event type.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

request_kinds! {
    Health => "health",
    OrgInstall => "org_install",
    OrgUninstall => "org_uninstall",
    Detection => "detection",
    Request => "request",
    GetResource => "get_resource",
    DeploymentEvent => "deployment_event",
    LogEvent => "log_event",
    OrgPer1h => "org_per_1h",
    OrgPer3h => "org_per_3h",
    OrgPer12h => "org_per_12h",
    OrgPer24h => "org_per_24h",
    OrgPer7d => "org_per_7d",
    OrgPer30d => "org_per_30d",
    OncePer1h => "once_per_1h",
    OncePer3h => "once_per_3h",
    OncePer12h => "once_per_12h",
    OncePer24h => "once_per_24h",
    OncePer7d => "once_per_7d",
    OncePer30d => "once_per_30d",
    SensorPer1h => "sensor_per_1h",
    SensorPer3h => "sensor_per_3h",
    SensorPer12h => "sensor_per_12h",
    SensorPer24h => "sensor_per_24h",
    SensorPer7d => "sensor_per_7d",
    SensorPer30d => "sensor_per_30d",
    NewSensor => "new_sensor",
    ServiceError => "service_error",
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User callbacks keyed by request kind.
#[derive(Clone, Default)]
pub struct CallbackTable {
    handlers: BTreeMap<RequestKind, Handler>,
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTable")
            .field("callbacks", &self.names())
            .finish()
    }
}

impl CallbackTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ReservedCallback`] for `health` and
    /// [`RegistrationError::DuplicateCallback`] when `kind` is already taken.
    pub fn insert(&mut self, kind: RequestKind, handler: Handler) -> Result<(), RegistrationError> {
        if kind == RequestKind::Health {
            return Err(RegistrationError::ReservedCallback {
                name: kind.as_str(),
            });
        }
        if self.handlers.contains_key(&kind) {
            return Err(RegistrationError::DuplicateCallback {
                name: kind.as_str(),
            });
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Returns the handler registered for `kind`.
    #[must_use]
    pub fn get(&self, kind: RequestKind) -> Option<&Handler> {
        self.handlers.get(&kind)
    }

    /// Sorted names of every callable request, including `health`.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().map(|kind| kind.as_str()).collect();
        names.push(RequestKind::Health.as_str());
        names.sort_unstable();
        names
    }
}
