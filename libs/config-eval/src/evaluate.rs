//! Recursive schema evaluation

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::normalized::{Normalized, NormalizedConfig, NormalizedValue};
use crate::schema::{Property, Schema, SchemaNode, ValueType};

/// A validation failure tagged with its dotted field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of evaluating a raw object against a schema
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
    pub normalized: NormalizedConfig,
}

impl EvaluationResult {
    /// Turn the result into the normalized tree, or the collected errors
    pub fn into_result(self) -> Result<NormalizedConfig, Vec<FieldError>> {
        if self.is_valid {
            Ok(self.normalized)
        } else {
            Err(self.errors)
        }
    }
}

/// Evaluate `raw` against `schema`.
///
/// Child groups are valid only if all of their children are; errors from the
/// whole tree are concatenated in schema order and tagged with their dotted
/// path below `path_prefix`. A child subtree is stored in the normalized
/// output only when it evaluated cleanly.
pub fn evaluate(schema: &Schema, raw: &Value, path_prefix: &str) -> EvaluationResult {
    let mut result = EvaluationResult {
        is_valid: true,
        errors: Vec::new(),
        normalized: NormalizedConfig::new(),
    };
    let empty = Value::Object(Map::new());

    for (key, node) in schema.entries() {
        let path = crate::join_path(path_prefix, key);
        let raw_value = raw.get(key);

        match node {
            SchemaNode::Group(child) => {
                let child_raw = match raw_value {
                    None | Some(Value::Null) => &empty,
                    Some(value @ Value::Object(_)) => value,
                    Some(other) => {
                        result.is_valid = false;
                        result.errors.push(FieldError {
                            path,
                            message: format!("expected an object but found {}", type_name(other)),
                        });
                        continue;
                    }
                };

                let child_result = evaluate(child, child_raw, &path);
                result.is_valid &= child_result.is_valid;
                result.errors.extend(child_result.errors);
                if child_result.is_valid {
                    result
                        .normalized
                        .insert(key, Normalized::Group(child_result.normalized));
                }
            }
            SchemaNode::Leaf(property) => match evaluate_property(property, key, raw_value) {
                Ok(value) => result.normalized.insert(key, Normalized::Value(value)),
                Err(message) => {
                    result.is_valid = false;
                    result.errors.push(FieldError { path, message });
                }
            },
        }
    }

    result
}

fn evaluate_property(
    property: &Property,
    key: &str,
    raw: Option<&Value>,
) -> Result<NormalizedValue, String> {
    let mut value = raw.filter(|v| !v.is_null()).cloned();
    if let Some(default) = property.default_value() {
        if value.as_ref().map_or(true, is_falsy) {
            value = Some(default.clone());
        }
    }

    let normalized = NormalizedValue {
        value: value.clone(),
        key: property.external_key().unwrap_or(key).to_string(),
        name: property.label().map(str::to_string),
    };

    let Some(present) = value else {
        if property.is_optional() {
            return Ok(normalized);
        }
        return Err("field is required".to_string());
    };

    // Patterns only constrain values that are actually there
    for pattern in property.patterns() {
        match pattern.regex() {
            Some(re) if re.is_match(&as_text(&present)) => {}
            Some(_) => return Err(format!("value does not match pattern '{}'", pattern)),
            None => return Err(format!("invalid pattern '{}'", pattern)),
        }
    }

    if !property.value_type().matches(&present) {
        return Err(format!(
            "expected {} but found {}",
            property.value_type(),
            type_name(&present)
        ));
    }

    Ok(normalized)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    ValueType::of(value).map_or("null", |t| t.name())
}
