//! Continuation tokens and the correlation namespace that carries them.
//!
//! A correlation string has the form `{namespace}/{token}`, where the token is
//! the compact JSON encoding of a [`ContinuationToken`]. The platform echoes
//! the string back verbatim on every event caused by the tasking.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::envelope::{Dict, null_as_empty};
use crate::registration::RegistrationError;

const CALLBACK_ID_LEN: usize = 8;

/// Stable identity of an interactive callback.
///
/// Derived from the service secret and the callback name, truncated to eight
/// hex characters. Distinct names may collide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(String);

impl CallbackId {
    /// Derives the identity of `name` under `secret`.
    #[must_use]
    pub fn derive(secret: &[u8], name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(b"/");
        hasher.update(name.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(CALLBACK_ID_LEN);
        Self(digest)
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty, as in tokens that omit it.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised while encoding or decoding a continuation token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token could not be serialised.
    #[error("failed to encode continuation token: {0}")]
    Encode(#[source] serde_json::Error),
    /// The token text is not a valid token.
    #[error("failed to decode continuation token: {0}")]
    Decode(#[source] serde_json::Error),
}

/// State carried across an asynchronous round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuationToken {
    /// Callback to resume.
    #[serde(rename = "cb", default)]
    pub callback_id: CallbackId,
    /// Job to resume, if any.
    #[serde(rename = "j", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Session to resume, if any.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Caller-defined context.
    #[serde(rename = "c", default, deserialize_with = "null_as_empty")]
    pub context: Dict,
}

impl ContinuationToken {
    /// Creates a token for `callback_id` with an empty context.
    #[must_use]
    pub fn new(callback_id: CallbackId) -> Self {
        Self {
            callback_id,
            ..Self::default()
        }
    }

    /// Encodes the token as compact JSON.
    pub fn encode(&self) -> Result<String, TokenError> {
        serde_json::to_string(self).map_err(TokenError::Encode)
    }

    /// Decodes a token from JSON text.
    pub fn decode(text: &str) -> Result<Self, TokenError> {
        serde_json::from_str(text).map_err(TokenError::Decode)
    }
}

/// Per-service correlation prefix, `svc-{service}-ex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    /// Builds the namespace of `service_name`.
    ///
    /// # Errors
    ///
    /// Rejects empty names and names containing `/`, which would make the
    /// correlation string ambiguous.
    pub fn for_service(service_name: &str) -> Result<Self, RegistrationError> {
        if service_name.is_empty() || service_name.contains('/') {
            return Err(RegistrationError::InvalidServiceName {
                name: service_name.to_owned(),
            });
        }
        Ok(Self(format!("svc-{service_name}-ex")))
    }

    /// Returns the namespace text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Detection name reported by the interactive rule.
    #[must_use]
    pub fn subscription(&self) -> String {
        format!("__{}", self.0)
    }

    /// Builds the correlation string carrying `token`.
    pub fn correlation(&self, token: &ContinuationToken) -> Result<String, TokenError> {
        Ok(format!("{}/{}", self.0, token.encode()?))
    }

    /// Extracts the token from a correlation string.
    ///
    /// Returns `None` when the string belongs to another namespace or the
    /// token does not decode.
    #[must_use]
    pub fn parse(&self, correlation: &str) -> Option<ContinuationToken> {
        let encoded = correlation.strip_prefix(self.0.as_str())?.strip_prefix('/')?;
        ContinuationToken::decode(encoded).ok()
    }

    /// Detection rule that routes tasking results back to the service.
    ///
    /// The rule set is keyed by the namespace, so pushing it repeatedly
    /// replaces the same entry.
    #[must_use]
    pub fn rule(&self) -> Dict {
        let mut rules = Dict::new();
        rules.insert(
            self.0.clone(),
            json!({
                "namespace": "managed",
                "detect": {
                    "op": "and",
                    "rules": [
                        {
                            "op": "starts with",
                            "path": "routing/investigation_id",
                            "value": self.0,
                        },
                        {
                            "op": "is",
                            "not": true,
                            "path": "routing/event_type",
                            "value": "CLOUD_NOTIFICATION",
                        },
                    ],
                },
                "respond": [
                    {"action": "report", "name": self.subscription()},
                ],
            }),
        );
        rules
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
