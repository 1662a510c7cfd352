//! Schema validation helpers.
//!
//! This module validates a `serde_json::Value` against a [`Schema`]: required
//! attributes, value types and the [`Validator`]s attached to each attribute.
//! Problems are reported as [`Diagnostic`]s carrying the attribute path.
//!
//! # Example
//!
//! ```
//! use bblnazuredevops_provider::schema::{Attribute, Schema, Validator};
//! use bblnazuredevops_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("project_id", Attribute::required_string().with_validator(Validator::Uuid))
//!     .with_attribute("timeout", Attribute::optional_int64());
//!
//! let input = json!({
//!     "project_id": "9083e944-8e9e-405e-960a-c80180aa71e6",
//!     "timeout": 60
//! });
//! assert!(validate(&schema, &input).is_empty());
//!
//! let input = json!({ "project_id": "not-a-uuid" });
//! let diagnostics = validate(&schema, &input);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("project_id".to_string()));
//! ```

use reqwest::Url;
use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema, Validator};

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Validators run on values of the right type
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            // Treat a missing configuration as empty so required attributes are reported.
            for (name, attr) in &schema.attributes {
                validate_attribute(attr, None, name, &mut diagnostics);
            }
            return diagnostics;
        },
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
///
/// Returns `true` if valid, `false` otherwise.
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Skip computed-only attributes (provider sets these)
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required && attr.default.is_none() && attr.env_default.is_none() {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                for validator in &attr.validators {
                    run_validator(validator, v, path, diagnostics);
                }
            }
        },
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
    }
}

fn run_validator(validator: &Validator, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    // Collections are checked element by element.
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                run_validator(validator, item, &format!("{}.{}", path, i), diagnostics);
            }
            return;
        },
        Value::Object(map) => {
            for (key, item) in map {
                run_validator(validator, item, &format!("{}.{}", path, key), diagnostics);
            }
            return;
        },
        _ => {},
    }

    let problem = match (validator, value) {
        (Validator::NotWhitespace, Value::String(s)) if s.trim().is_empty() => {
            Some("must not be empty or consist only of whitespace".to_string())
        },
        (Validator::Uuid, Value::String(s)) if uuid::Uuid::parse_str(s).is_err() => {
            Some(format!("expected a UUID, got {:?}", s))
        },
        (Validator::HttpUrlNoTrailingSlash, Value::String(s)) => http_url_problem(s),
        (Validator::NoZeroValues, Value::String(s)) if s.is_empty() => {
            Some("must not be empty".to_string())
        },
        (Validator::NoZeroValues, Value::Number(n)) if n.as_f64() == Some(0.0) => {
            Some("must not be zero".to_string())
        },
        (Validator::OneOf(allowed), Value::String(s))
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(s)) =>
        {
            Some(format!("expected one of {:?}, got {:?}", allowed, s))
        },
        _ => None,
    };

    if let Some(detail) = problem {
        diagnostics.push(
            Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                .with_detail(detail)
                .with_attribute(path),
        );
    }
}

fn http_url_problem(s: &str) -> Option<String> {
    if s.ends_with('/') {
        return Some(format!("should not end with slash, got {:?}", s));
    }
    match Url::parse(s) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => None,
        Ok(_) => Some(format!("expected an http or https URL, got {:?}", s)),
        Err(e) => Some(format!("expected a URL, got {:?}: {}", s, e)),
    }
}

// Helper functions

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    as_int64(value).is_some()
}

/// An integer value, accepting integral floats.
pub(crate) fn as_int64(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    // Hosts may send integral floats
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}
