//! Unit tests for parameter declarations and value validation.

use rstest::rstest;
use serde_json::{Value, json};

use super::*;

fn def(kind: ParameterType) -> ParameterDef {
    ParameterDef::new(kind, "a parameter")
}

fn kind_of(result: Result<(), ValidationError>) -> Option<ValidationErrorKind> {
    result.err().map(|error| error.kind)
}

// ---------------------------------------------------------------------------
// Type names
// ---------------------------------------------------------------------------

#[rstest]
#[case("str", ParameterType::Str)]
#[case("string", ParameterType::Str)]
#[case("int", ParameterType::Int)]
#[case("bool", ParameterType::Bool)]
#[case("enum", ParameterType::Enum)]
#[case("uuid", ParameterType::Uuid)]
#[case("flag", ParameterType::Flag)]
fn parses_supported_type_names(#[case] name: &str, #[case] expected: ParameterType) {
    assert_eq!(ParameterType::parse(name), Ok(expected));
}

#[test]
fn unsupported_type_lists_supported_types_sorted() {
    let error = ParameterType::parse("float").expect_err("float is unsupported");
    assert_eq!(error.kind, ValidationErrorKind::UnsupportedType);
    assert_eq!(error.expected, "bool, enum, flag, int, str, uuid");
    assert_eq!(error.actual, "float");
}

#[test]
fn definition_serialises_to_wire_shape() {
    let enum_def = def(ParameterType::Enum).required().with_values(["a", "b"]);
    assert_eq!(
        serde_json::to_value(&enum_def).expect("definition serialises"),
        json!({"type": "enum", "desc": "a parameter", "is_required": true, "values": ["a", "b"]})
    );
    assert_eq!(
        serde_json::to_value(def(ParameterType::Str)).expect("definition serialises"),
        json!({"type": "str", "desc": "a parameter", "is_required": false})
    );
}

#[test]
fn definition_with_unknown_type_fails_to_deserialise() {
    let error = serde_json::from_value::<ParameterDef>(json!({"type": "float", "desc": "x"}))
        .expect_err("unknown type must fail");
    assert!(error.to_string().contains("bool, enum, flag, int, str, uuid"));
}

// ---------------------------------------------------------------------------
// Declaration checks
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty_description(ParameterDef::new(ParameterType::Str, ""), ValidationErrorKind::EmptyDescription)]
#[case::enum_without_values(def(ParameterType::Enum), ValidationErrorKind::EnumWithoutValues)]
#[case::values_on_str(def(ParameterType::Str).with_values(["x"]), ValidationErrorKind::UnexpectedValues)]
fn rejects_malformed_declarations(#[case] param: ParameterDef, #[case] expected: ValidationErrorKind) {
    let error = param.check("p").expect_err("declaration must be rejected");
    assert_eq!(error.kind, expected);
    assert_eq!(error.key, "p");
}

#[test]
fn rejects_empty_parameter_name() {
    let mut params = ParameterMap::new();
    params.insert(String::new(), def(ParameterType::Str));
    let error = check_parameters(&params).expect_err("empty name must be rejected");
    assert_eq!(error.kind, ValidationErrorKind::EmptyName);
}

#[test]
fn accepts_well_formed_declarations() {
    let mut params = ParameterMap::new();
    params.insert(String::from("mode"), def(ParameterType::Enum).with_values(["fast"]));
    params.insert(String::from("verbose"), def(ParameterType::Flag));
    assert_eq!(check_parameters(&params), Ok(()));
}

// ---------------------------------------------------------------------------
// Value validation
// ---------------------------------------------------------------------------

#[rstest]
#[case::flag_empty(ParameterType::Flag, json!(""), None)]
#[case::flag_value(ParameterType::Flag, json!("yes"), Some(ValidationErrorKind::FlagHasValue))]
#[case::flag_bool(ParameterType::Flag, json!(true), Some(ValidationErrorKind::FlagHasValue))]
#[case::bool_native(ParameterType::Bool, json!(false), None)]
#[case::bool_text(ParameterType::Bool, json!("TRUE"), None)]
#[case::bool_digit(ParameterType::Bool, json!("0"), None)]
#[case::bool_garbage(ParameterType::Bool, json!("maybe"), Some(ValidationErrorKind::WrongType))]
#[case::bool_number(ParameterType::Bool, json!(1), Some(ValidationErrorKind::WrongType))]
#[case::int_text(ParameterType::Int, json!("-42"), None)]
#[case::int_number(ParameterType::Int, json!(7), None)]
#[case::int_float(ParameterType::Int, json!(1.5), Some(ValidationErrorKind::WrongType))]
#[case::int_hex(ParameterType::Int, json!("0x10"), Some(ValidationErrorKind::WrongType))]
#[case::str_text(ParameterType::Str, json!("hi"), None)]
#[case::str_number(ParameterType::Str, json!(3), Some(ValidationErrorKind::WrongType))]
#[case::uuid_valid(ParameterType::Uuid, json!("67e55044-10b1-426f-9247-bb680e5fe0c8"), None)]
#[case::uuid_invalid(ParameterType::Uuid, json!("not-a-uuid"), Some(ValidationErrorKind::WrongType))]
fn validates_values_by_type(
    #[case] kind: ParameterType,
    #[case] value: Value,
    #[case] expected: Option<ValidationErrorKind>,
) {
    assert_eq!(kind_of(validate(&def(kind), Some(&value))), expected);
}

#[rstest]
#[case::member(json!("fast"), None)]
#[case::case_differs(json!("FAST"), Some(ValidationErrorKind::NotInEnum))]
#[case::not_member(json!("slow"), Some(ValidationErrorKind::NotInEnum))]
#[case::not_string(json!(1), Some(ValidationErrorKind::NotInEnum))]
fn enum_values_match_exactly(#[case] value: Value, #[case] expected: Option<ValidationErrorKind>) {
    let param = def(ParameterType::Enum).with_values(["fast", "safe"]);
    assert_eq!(kind_of(validate(&param, Some(&value))), expected);
}

#[rstest]
#[case::absent(None)]
#[case::null(Some(Value::Null))]
fn missing_values_only_fail_when_required(#[case] value: Option<Value>) {
    let optional = def(ParameterType::Int);
    assert_eq!(validate(&optional, value.as_ref()), Ok(()));

    let required = def(ParameterType::Int).required();
    assert_eq!(
        kind_of(validate(&required, value.as_ref())),
        Some(ValidationErrorKind::MissingRequired)
    );
}

#[test]
fn validate_all_names_the_offending_key() {
    let mut params = ParameterMap::new();
    params.insert(String::from("msg"), def(ParameterType::Str).required());
    params.insert(String::from("count"), def(ParameterType::Int));

    let data = json!({"count": "3"});
    let error = validate_all(&params, data.as_object().expect("object literal"))
        .expect_err("missing msg must fail");

    assert_eq!(error.kind, ValidationErrorKind::MissingRequired);
    assert_eq!(error.key, "msg");
}
