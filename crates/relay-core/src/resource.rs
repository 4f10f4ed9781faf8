//! `get_resource` request parsing and response shaping.
//!
//! The platform asks for either one resource (`{"resource": "name"}`) or a
//! batch (`{"resource": ["a", "b"]}`). Single requests are answered with the
//! resource fields at the top of the payload, batches under `resources`.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::envelope::Dict;
use crate::request::RequestError;
use crate::response::Response;

/// Error reported when a requested resource is unknown.
pub const RESOURCE_NOT_AVAILABLE: &str = "resource not available";

/// Resource content ready to be returned to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Platform resource category.
    pub category: String,
    /// Lowercase hex SHA-256 of the raw content.
    pub hash: String,
    /// Base64 encoding of the raw content.
    pub data: String,
}

impl Resource {
    /// Builds a resource from raw content.
    pub fn from_data(category: impl Into<String>, data: &[u8]) -> Self {
        Self {
            category: category.into(),
            hash: hex::encode(Sha256::digest(data)),
            data: STANDARD.encode(data),
        }
    }

    fn to_value(&self, include_data: bool) -> Value {
        let mut entry = json!({"hash": self.hash, "res_cat": self.category});
        if include_data {
            if let Some(map) = entry.as_object_mut() {
                map.insert(String::from("res_data"), Value::String(self.data.clone()));
            }
        }
        entry
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Names {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawResourceRequest {
    resource: Names,
    #[serde(default)]
    is_include_data: bool,
}

/// Parsed `get_resource` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    names: Vec<String>,
    single: bool,
    include_data: bool,
}

impl ResourceRequest {
    /// Parses the request from an event payload.
    pub fn from_event(data: &Dict) -> Result<Self, RequestError> {
        let value = data.get("resource").ok_or(RequestError::Missing {
            key: "resource",
            label: "resource name",
        })?;
        let raw: RawResourceRequest = serde_json::from_value(json!({
            "resource": value,
            "is_include_data": data.get("is_include_data").and_then(Value::as_bool).unwrap_or(false),
        }))
        .map_err(|_| RequestError::NotAString { key: "resource" })?;
        let (names, single) = match raw.resource {
            Names::One(name) => (vec![name], true),
            Names::Many(names) => (names, false),
        };
        Ok(Self {
            names,
            single,
            include_data: raw.is_include_data,
        })
    }

    /// Requested resource names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether the resource content should be returned.
    #[must_use]
    pub const fn include_data(&self) -> bool {
        self.include_data
    }

    /// Builds the response for the supplied resources.
    ///
    /// Fails with [`RESOURCE_NOT_AVAILABLE`] when any requested name is
    /// missing from `resources`.
    #[must_use]
    pub fn supply(&self, resources: &BTreeMap<String, Resource>) -> Response {
        let mut found = Dict::new();
        for name in &self.names {
            let Some(resource) = resources.get(name) else {
                return Response::failure(RESOURCE_NOT_AVAILABLE);
            };
            found.insert(name.clone(), resource.to_value(self.include_data));
        }

        if self.single {
            return match found.into_iter().next() {
                Some((_, Value::Object(entry))) => Response::success(entry),
                _ => Response::failure(RESOURCE_NOT_AVAILABLE),
            };
        }
        Response::ok().with_data("resources", Value::Object(found))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Dict {
        value.as_object().cloned().expect("payload is an object")
    }

    #[fixture]
    fn catalog() -> BTreeMap<String, Resource> {
        let mut resources = BTreeMap::new();
        resources.insert(String::from("rules"), Resource::from_data("detect", b"hello"));
        resources.insert(String::from("lookup"), Resource::from_data("lookup", b""));
        resources
    }

    #[test]
    fn resource_hash_and_encoding() {
        let resource = Resource::from_data("detect", b"hello");
        assert_eq!(
            resource.hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(resource.data, "aGVsbG8=");
    }

    #[rstest]
    fn single_request_answers_flat(catalog: BTreeMap<String, Resource>) {
        let request = ResourceRequest::from_event(&payload(json!({
            "resource": "rules",
            "is_include_data": true
        })))
        .expect("request parses");
        let response = request.supply(&catalog);
        assert!(response.is_success());
        assert_eq!(response.data().get("res_cat"), Some(&json!("detect")));
        assert_eq!(response.data().get("res_data"), Some(&json!("aGVsbG8=")));
    }

    #[rstest]
    fn batch_request_nests_resources(catalog: BTreeMap<String, Resource>) {
        let request = ResourceRequest::from_event(&payload(json!({
            "resource": ["rules", "lookup"]
        })))
        .expect("request parses");
        let response = request.supply(&catalog);
        let resources = response.data().get("resources").expect("resources key");
        assert!(resources.pointer("/rules/hash").is_some());
        assert!(resources.pointer("/lookup/res_data").is_none());
    }

    #[rstest]
    #[case::single(json!({"resource": "absent"}))]
    #[case::batch(json!({"resource": ["rules", "absent"]}))]
    fn unknown_resources_are_not_available(
        catalog: BTreeMap<String, Resource>,
        #[case] data: Value,
    ) {
        let request = ResourceRequest::from_event(&payload(data)).expect("request parses");
        let response = request.supply(&catalog);
        assert_eq!(response.error(), Some(RESOURCE_NOT_AVAILABLE));
    }

    #[test]
    fn missing_resource_key_is_reported() {
        let error = ResourceRequest::from_event(&Dict::new()).expect_err("resource is required");
        assert!(matches!(error, RequestError::Missing { key: "resource", .. }));
    }
}
