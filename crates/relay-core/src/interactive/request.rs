//! Requests handed to interactive callbacks.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::Dict;
use crate::job::Job;
use crate::platform::OrgHandle;
use crate::request::Request;
use crate::schema::{ParameterMap, ParameterType, parse_bool};

/// Errors raised by the typed context getters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The key is absent from the context.
    #[error("key '{key}' not found")]
    Missing {
        /// Context key.
        key: String,
    },
    /// The value does not have the requested type.
    #[error("key '{key}' is not {expected}")]
    WrongType {
        /// Context key.
        key: String,
        /// Requested type, with its article.
        expected: &'static str,
    },
    /// The value is not a valid UUID.
    #[error("could not parse uuid from key '{key}'")]
    InvalidUuid {
        /// Context key.
        key: String,
    },
    /// The key is not a declared parameter.
    #[error("key '{key}' is not an expected parameter")]
    NotExpected {
        /// Context key.
        key: String,
    },
    /// The declared parameter is not an enum.
    #[error("key '{key}' is not of enum type")]
    NotEnum {
        /// Context key.
        key: String,
    },
    /// The value is not one of the declared enum values.
    #[error("value '{value}' is not a valid enum value for key '{key}'")]
    InvalidEnumValue {
        /// Context key.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Request reconstructed from a continuation token and the detection that
/// carried it back.
#[derive(Clone)]
pub struct InteractiveRequest {
    /// Platform capability of the originating call.
    pub org: Option<Arc<dyn OrgHandle>>,
    /// Organisation identifier.
    pub org_id: String,
    /// Sensor that produced the detection; may be empty.
    pub sensor_id: String,
    /// Detection payload.
    pub event: Dict,
    /// Job resumed from the token.
    pub job: Option<Job>,
    /// Context stored in the token.
    pub context: Dict,
    /// Session resumed from the token.
    pub session_id: Option<String>,
    /// Underlying `detection` request.
    pub service_request: Request,
}

impl fmt::Debug for InteractiveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveRequest")
            .field("org", &self.org.is_some())
            .field("org_id", &self.org_id)
            .field("sensor_id", &self.sensor_id)
            .field("job", &self.job.as_ref().map(Job::id))
            .field("context", &self.context)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl InteractiveRequest {
    /// Returns the raw context value for `key`.
    pub fn get(&self, key: &str) -> Result<&Value, ContextError> {
        self.context.get(key).ok_or_else(|| ContextError::Missing {
            key: key.to_owned(),
        })
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> Result<&str, ContextError> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| wrong_type(key, "a string"))
    }

    /// Returns the integer stored under `key`, accepting base-10 strings.
    pub fn get_int(&self, key: &str) -> Result<i64, ContextError> {
        match self.get(key)? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| wrong_type(key, "an integer"))
    }

    /// Returns the boolean stored under `key`, accepting boolean strings.
    pub fn get_bool(&self, key: &str) -> Result<bool, ContextError> {
        match self.get(key)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => parse_bool(text),
            _ => None,
        }
        .ok_or_else(|| wrong_type(key, "a boolean"))
    }

    /// Returns the UUID stored under `key`.
    pub fn get_uuid(&self, key: &str) -> Result<Uuid, ContextError> {
        Uuid::parse_str(self.get_str(key)?).map_err(|_| ContextError::InvalidUuid {
            key: key.to_owned(),
        })
    }

    /// Returns the enum value stored under `key`, checked against the
    /// declaration in `params`.
    pub fn get_enum(&self, key: &str, params: &ParameterMap) -> Result<&str, ContextError> {
        let def = params.get(key).ok_or_else(|| ContextError::NotExpected {
            key: key.to_owned(),
        })?;
        if def.kind != ParameterType::Enum {
            return Err(ContextError::NotEnum {
                key: key.to_owned(),
            });
        }
        let value = self.get_str(key)?;
        if def.values.iter().any(|allowed| allowed == value) {
            Ok(value)
        } else {
            Err(ContextError::InvalidEnumValue {
                key: key.to_owned(),
                value: value.to_owned(),
            })
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ContextError {
    ContextError::WrongType {
        key: key.to_owned(),
        expected,
    }
}
