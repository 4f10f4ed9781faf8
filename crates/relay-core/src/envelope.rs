//! Wire envelope codec and protocol gate.
//!
//! Every inbound call carries one JSON envelope:
//!
//! ```text
//! {"version":1,"jwt":"...","oid":"...","mid":"...","deadline":1700000000.5,
//!  "etype":"command","data":{...}}
//! ```
//!
//! `deadline` is expressed in fractional unix seconds. Absent, `null` and `0`
//! all mean "no deadline".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

/// Highest protocol version this crate understands.
pub const SUPPORTED_VERSION: i64 = 1;

/// Payload map carried by envelopes, requests and responses.
pub type Dict = Map<String, Value>;

/// Errors raised while decoding or gating an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope could not be decoded.
    #[error("invalid format: {message}")]
    Malformed {
        /// Decoder message.
        message: String,
        /// Underlying decoder error.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The envelope announces a protocol newer than [`SUPPORTED_VERSION`].
    #[error("unsupported version (> {supported})")]
    UnsupportedVersion {
        /// Version announced by the caller.
        version: i64,
        /// Highest supported version.
        supported: i64,
    },
    /// The envelope deadline has already passed.
    #[error("deadline exceeded")]
    DeadlineExceeded {
        /// Deadline carried by the envelope.
        deadline: OffsetDateTime,
    },
}

impl EnvelopeError {
    fn from_json(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Decoded wire envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    /// Protocol version announced by the caller.
    #[serde(default)]
    pub version: i64,
    /// Platform credential; may be empty.
    #[serde(rename = "jwt", default)]
    pub auth_token: String,
    /// Organisation identifier; may be empty.
    #[serde(rename = "oid", default)]
    pub org_id: String,
    /// Message identifier.
    #[serde(rename = "mid", default)]
    pub message_id: String,
    /// Point in time after which the call must not run.
    #[serde(default, with = "deadline_seconds")]
    pub deadline: Option<OffsetDateTime>,
    /// Event type used to select a handler.
    #[serde(rename = "etype", default)]
    pub event_type: String,
    /// Event payload.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Dict,
}

impl Envelope {
    /// Decodes an envelope from an already-parsed JSON value.
    pub fn decode(value: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(value).map_err(EnvelopeError::from_json)
    }

    /// Decodes an envelope from raw request bytes.
    pub fn from_slice(raw: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(raw).map_err(EnvelopeError::from_json)
    }

    /// Encodes the envelope as a JSON value.
    pub fn encode(&self) -> Result<Value, EnvelopeError> {
        serde_json::to_value(self).map_err(EnvelopeError::from_json)
    }

    /// Encodes the envelope as JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::from_json)
    }

    /// Rejects versions newer than [`SUPPORTED_VERSION`].
    pub fn check_version(&self) -> Result<(), EnvelopeError> {
        if self.version > SUPPORTED_VERSION {
            return Err(EnvelopeError::UnsupportedVersion {
                version: self.version,
                supported: SUPPORTED_VERSION,
            });
        }
        Ok(())
    }

    /// Rejects envelopes whose deadline lies strictly before `now`.
    pub fn check_deadline(&self, now: OffsetDateTime) -> Result<(), EnvelopeError> {
        match self.deadline {
            Some(deadline) if deadline < now => Err(EnvelopeError::DeadlineExceeded { deadline }),
            _ => Ok(()),
        }
    }
}

pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Dict, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Dict>::deserialize(deserializer)?.unwrap_or_default())
}

mod deadline_seconds {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Number;
    use time::{Duration, OffsetDateTime};

    pub(super) fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            None => serializer.serialize_i64(0),
            Some(deadline) => {
                let elapsed = *deadline - OffsetDateTime::UNIX_EPOCH;
                if elapsed.subsec_nanoseconds() == 0 {
                    serializer.serialize_i64(elapsed.whole_seconds())
                } else {
                    serializer.serialize_f64(elapsed.as_seconds_f64())
                }
            }
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(number) = Option::<Number>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let offset = if let Some(seconds) = number.as_i64() {
            if seconds == 0 {
                return Ok(None);
            }
            Duration::seconds(seconds)
        } else {
            let seconds = number
                .as_f64()
                .ok_or_else(|| D::Error::custom("deadline is not representable"))?;
            if seconds == 0.0 {
                return Ok(None);
            }
            Duration::checked_seconds_f64(seconds)
                .ok_or_else(|| D::Error::custom("deadline is out of range"))?
        };
        OffsetDateTime::UNIX_EPOCH
            .checked_add(offset)
            .map(Some)
            .ok_or_else(|| D::Error::custom("deadline is out of range"))
    }
}
