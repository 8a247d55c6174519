//! Plan validation against a [`Schema`].
//!
//! Runs before a plan is decoded into a resource's typed state and before any
//! remote call. Every problem is collected so the operator sees all of them in
//! one apply.
//!
//! # Example
//!
//! ```
//! use segment_provider::schema::{Schema, Attribute};
//! use segment_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("settings", Attribute::optional_json());
//!
//! let diagnostics = validate(&schema, &json!({"name": "web", "settings": "{\"a\":1}"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "web", "settings": "[1]"}));
//! assert_eq!(diagnostics[0].attribute, Some("settings".to_string()));
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use crate::settings;

/// Validate a JSON value against a schema.
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the remote system sets them)
/// - Values must match the attribute type, recursively
/// - `Json` attributes must hold the text of a JSON object
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match value.as_object() {
        Some(obj) => validate_attributes(&schema.attributes, obj, &mut diagnostics),
        None => diagnostics.push(
            Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", settings::json_type_name(value))),
        ),
    }
    diagnostics
}

/// Whether a value passes validation.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attributes(
    attributes: &BTreeMap<String, Attribute>,
    obj: &Map<String, Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr) in attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        match obj.get(name) {
            None | Some(Value::Null) => {
                if attr.flags.required {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{}'", name))
                            .with_attribute(name.as_str()),
                    );
                }
            }
            Some(value) => validate_type(&attr.attr_type, value, name, diagnostics),
        }
    }
}

fn validate_type(ty: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match ty {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !value.is_i64() {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_null() {
                        validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                    }
                }
            }
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    if !item.is_null() {
                        validate_type(element, item, &format!("{}.{}", path, key), diagnostics);
                    }
                }
            }
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(fields) => match value.as_object() {
            // Object fields carry no required/optional flags; only present values are checked.
            Some(obj) => {
                for (name, field_type) in fields {
                    if let Some(field) = obj.get(name).filter(|v| !v.is_null()) {
                        let at = format!("{}.{}", path, name);
                        validate_type(field_type, field, &at, diagnostics);
                    }
                }
            }
            None => diagnostics.push(type_error(path, "object", value)),
        },
        AttributeType::Json => match value.as_str() {
            Some(text) => {
                if let Err(e) = settings::decode(text) {
                    diagnostics.push(
                        Diagnostic::error(format!("Invalid JSON in attribute '{}'", path))
                            .with_detail(e.to_string())
                            .with_attribute(path),
                    );
                }
            }
            None => diagnostics.push(type_error(path, "JSON string", value)),
        },
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!(
            "Expected {}, got {}",
            expected,
            settings::json_type_name(got)
        ))
        .with_attribute(path)
}
