//! Config evaluation
//!
//! Validates and normalizes nested JSON configuration objects against a
//! [`Schema`] built from [`Property`] combinators or parsed from a JSON
//! template. Evaluation never stops at the first problem: every invalid leaf
//! in the tree is reported as a [`FieldError`] tagged with its dotted path.

pub mod evaluate;
pub mod normalized;
pub mod schema;
pub mod template;

pub use evaluate::{evaluate, EvaluationResult, FieldError};
pub use normalized::{Normalized, NormalizedConfig, NormalizedValue};
pub use schema::{Constraint, Pattern, Property, Schema, SchemaNode, ValueType};
pub use template::{parse_expression, parse_template, TemplateError};

/// Join a dotted path prefix and a key
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
