//! Typed parameter declarations and value validation.
//!
//! Parameter declarations are published through the health introspection
//! handler and enforced against command arguments and `request` payloads.
//! Validation only checks shape; business semantics stay with the handler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::Dict;

/// Declared parameters keyed by parameter name.
pub type ParameterMap = BTreeMap<String, ParameterDef>;

/// Value types a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterType {
    /// Free-form string.
    Str,
    /// Base-10 integer.
    Int,
    /// Boolean, optionally spelled as a string.
    Bool,
    /// One of a declared set of strings.
    Enum,
    /// RFC 4122 UUID string.
    Uuid,
    /// Presence-only switch that accepts no value.
    Flag,
}

impl ParameterType {
    /// Every supported type.
    pub const ALL: [Self; 6] = [
        Self::Str,
        Self::Int,
        Self::Bool,
        Self::Enum,
        Self::Uuid,
        Self::Flag,
    ];

    /// Parses a wire type name.
    ///
    /// `string` is accepted as an alias for `str`.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name {
            "str" | "string" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "enum" => Ok(Self::Enum),
            "uuid" => Ok(Self::Uuid),
            "flag" => Ok(Self::Flag),
            other => Err(ValidationError::new(
                ValidationErrorKind::UnsupportedType,
                "type",
                supported_type_list(),
                other,
            )),
        }
    }

    /// Returns the canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Enum => "enum",
            Self::Uuid => "uuid",
            Self::Flag => "flag",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ParameterType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ParameterType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name).map_err(serde::de::Error::custom)
    }
}

fn supported_type_list() -> String {
    let mut names: Vec<&str> = ParameterType::ALL.iter().map(|t| t.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

/// Machine-checkable category of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A required value was not supplied.
    MissingRequired,
    /// A flag was given a value.
    FlagHasValue,
    /// The value does not have the declared type.
    WrongType,
    /// The value is not one of the declared enum values.
    NotInEnum,
    /// The declared type is not supported.
    UnsupportedType,
    /// A declaration has an empty description.
    EmptyDescription,
    /// An enum declaration has no values.
    EnumWithoutValues,
    /// A non-enum declaration lists values.
    UnexpectedValues,
    /// A declaration has an empty name.
    EmptyName,
}

impl ValidationErrorKind {
    /// Returns a stable identifier for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequired => "missing_required",
            Self::FlagHasValue => "flag_has_value",
            Self::WrongType => "wrong_type",
            Self::NotInEnum => "not_in_enum",
            Self::UnsupportedType => "unsupported_type",
            Self::EmptyDescription => "empty_description",
            Self::EnumWithoutValues => "enum_without_values",
            Self::UnexpectedValues => "unexpected_values",
            Self::EmptyName => "empty_name",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid parameter '{key}' ({kind}): expected {expected}, got {actual}")]
pub struct ValidationError {
    /// Category of the violation.
    pub kind: ValidationErrorKind,
    /// Parameter name the violation refers to.
    pub key: String,
    /// What the schema expects.
    pub expected: String,
    /// What was found instead.
    pub actual: String,
}

impl ValidationError {
    /// Builds a validation error.
    pub fn new(
        kind: ValidationErrorKind,
        key: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    fn with_key(mut self, key: &str) -> Self {
        key.clone_into(&mut self.key);
        self
    }
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Declared value type.
    #[serde(rename = "type")]
    pub kind: ParameterType,
    /// Human-readable description.
    #[serde(rename = "desc")]
    pub description: String,
    /// Whether callers must supply a value.
    #[serde(rename = "is_required", default)]
    pub required: bool,
    /// Allowed values for [`ParameterType::Enum`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl ParameterDef {
    /// Declares an optional parameter.
    pub fn new(kind: ParameterType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: false,
            values: Vec::new(),
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the allowed values of an enum parameter.
    #[must_use]
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Checks that the declaration itself is well formed.
    pub fn check(&self, name: &str) -> Result<(), ValidationError> {
        if self.description.is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::EmptyDescription,
                name,
                "non-empty description",
                "empty description",
            ));
        }
        match (self.kind, self.values.is_empty()) {
            (ParameterType::Enum, true) => Err(ValidationError::new(
                ValidationErrorKind::EnumWithoutValues,
                name,
                "at least one enum value",
                "no values",
            )),
            (kind, false) if kind != ParameterType::Enum => Err(ValidationError::new(
                ValidationErrorKind::UnexpectedValues,
                name,
                "no values",
                format!("{} values on a {kind} parameter", self.values.len()),
            )),
            _ => Ok(()),
        }
    }
}

/// Checks every declaration in `params`, including the parameter names.
pub fn check_parameters(params: &ParameterMap) -> Result<(), ValidationError> {
    for (name, def) in params {
        if name.is_empty() {
            return Err(ValidationError::new(
                ValidationErrorKind::EmptyName,
                name,
                "non-empty parameter name",
                "empty name",
            ));
        }
        def.check(name)?;
    }
    Ok(())
}

/// Validates a single supplied value against its declaration.
///
/// `None` and JSON `null` are treated as "no value supplied". The returned
/// error carries an empty key; [`validate_all`] fills it in.
pub fn validate(def: &ParameterDef, value: Option<&Value>) -> Result<(), ValidationError> {
    let value = match value {
        None | Some(Value::Null) => {
            if def.required {
                return Err(ValidationError::new(
                    ValidationErrorKind::MissingRequired,
                    "",
                    format!("a {} value", def.kind),
                    "nothing",
                ));
            }
            return Ok(());
        }
        Some(value) => value,
    };

    match def.kind {
        ParameterType::Flag => check_flag(value),
        ParameterType::Bool => check_bool(value),
        ParameterType::Int => check_int(value),
        ParameterType::Str => check_str(value),
        ParameterType::Enum => check_enum(&def.values, value),
        ParameterType::Uuid => check_uuid(value),
    }
}

/// Validates every declared parameter against `data`, in name order.
pub fn validate_all(params: &ParameterMap, data: &Dict) -> Result<(), ValidationError> {
    for (name, def) in params {
        validate(def, data.get(name)).map_err(|error| error.with_key(name))?;
    }
    Ok(())
}

fn check_flag(value: &Value) -> Result<(), ValidationError> {
    match value {
        Value::String(text) if text.is_empty() => Ok(()),
        other => Err(ValidationError::new(
            ValidationErrorKind::FlagHasValue,
            "",
            "no value",
            describe(other),
        )),
    }
}

fn check_bool(value: &Value) -> Result<(), ValidationError> {
    let accepted = match value {
        Value::Bool(_) => true,
        Value::String(text) => parse_bool(text).is_some(),
        _ => false,
    };
    if accepted {
        Ok(())
    } else {
        Err(wrong_type("a boolean", value))
    }
}

fn check_int(value: &Value) -> Result<(), ValidationError> {
    let accepted = match value {
        Value::Number(number) => number.is_i64() || number.is_u64(),
        Value::String(text) => text.parse::<i64>().is_ok(),
        _ => false,
    };
    if accepted {
        Ok(())
    } else {
        Err(wrong_type("a base-10 integer", value))
    }
}

fn check_str(value: &Value) -> Result<(), ValidationError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(wrong_type("a string", value))
    }
}

fn check_enum(values: &[String], value: &Value) -> Result<(), ValidationError> {
    let matches = value
        .as_str()
        .is_some_and(|text| values.iter().any(|allowed| allowed == text));
    if matches {
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationErrorKind::NotInEnum,
            "",
            format!("one of [{}]", values.join(", ")),
            describe(value),
        ))
    }
}

fn check_uuid(value: &Value) -> Result<(), ValidationError> {
    let accepted = value
        .as_str()
        .is_some_and(|text| Uuid::parse_str(text).is_ok());
    if accepted {
        Ok(())
    } else {
        Err(wrong_type("a UUID", value))
    }
}

/// Parses the boolean spellings accepted on the wire.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn wrong_type(expected: &str, value: &Value) -> ValidationError {
    ValidationError::new(ValidationErrorKind::WrongType, "", expected, describe(value))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => String::from("null"),
        Value::Bool(flag) => format!("boolean {flag}"),
        Value::Number(number) => format!("number {number}"),
        Value::String(text) => format!("string {text:?}"),
        Value::Array(_) => String::from("array"),
        Value::Object(_) => String::from("object"),
    }
}

#[cfg(test)]
mod tests;
