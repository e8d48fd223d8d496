//! Schema combinators
//!
//! A [`Schema`] is an ordered tree. Internal nodes are nested schemas, leaves
//! are [`Property`] expressions built from a declared [`ValueType`] plus a list
//! of [`Constraint`]s.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde_json::Value;

/// Declared runtime type of a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Accepts any non-null value
    Any,
}

impl ValueType {
    /// Type name as written in templates
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Any => "any",
        }
    }

    /// Exact lookup of a type name as written in property expressions
    pub fn from_name(name: &str) -> Option<ValueType> {
        match name {
            "string" => Some(ValueType::String),
            "number" => Some(ValueType::Number),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "object" => Some(ValueType::Object),
            "array" => Some(ValueType::Array),
            "any" => Some(ValueType::Any),
            _ => None,
        }
    }

    /// Runtime type of a JSON value, `None` for null
    pub fn of(value: &Value) -> Option<ValueType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Boolean),
            Value::Number(_) => Some(ValueType::Number),
            Value::String(_) => Some(ValueType::String),
            Value::Array(_) => Some(ValueType::Array),
            Value::Object(_) => Some(ValueType::Object),
        }
    }

    /// Check whether a value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => !value.is_null(),
            declared => ValueType::of(value) == Some(*declared),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" => Ok(ValueType::String),
            "number" => Ok(ValueType::Number),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "object" => Ok(ValueType::Object),
            "array" => Ok(ValueType::Array),
            "any" => Ok(ValueType::Any),
            _ => Err(format!("Unknown value type: {}", s)),
        }
    }
}

/// Regex constraint, compiled when the property is built
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source).map_err(|e| e.to_string());
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Compiled regex, `None` when the pattern is invalid
    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref().ok()
    }

    /// Compile error, if any
    pub fn error(&self) -> Option<&str> {
        self.compiled.as_ref().err().map(String::as_str)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A single leaf constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Missing value is not an error
    Optional,

    /// Substituted when the raw value is falsy
    Default(Value),

    /// Present values must match the pattern
    Regex(Pattern),

    /// Human-facing label attached to the normalized value
    Named(String),

    /// External field name used when writing the value back out
    Keyed(String),
}

/// Leaf property expression
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    value_type: ValueType,
    constraints: Vec<Constraint>,
}

impl Property {
    /// Create a required property of the given type
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            constraints: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(ValueType::String)
    }

    pub fn number() -> Self {
        Self::new(ValueType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(ValueType::Boolean)
    }

    pub fn object() -> Self {
        Self::new(ValueType::Object)
    }

    pub fn array() -> Self {
        Self::new(ValueType::Array)
    }

    pub fn any() -> Self {
        Self::new(ValueType::Any)
    }

    /// Mark the property as optional
    pub fn optional(self) -> Self {
        self.with(Constraint::Optional)
    }

    /// Substitute `value` when the raw value is falsy
    pub fn default(self, value: impl Into<Value>) -> Self {
        self.with(Constraint::Default(value.into()))
    }

    /// Require present values to match `pattern`.
    ///
    /// An invalid pattern rejects every present value; templates report it
    /// when they are parsed.
    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.with(Constraint::Regex(Pattern::new(pattern)))
    }

    /// Attach a display label
    pub fn named(self, label: impl Into<String>) -> Self {
        self.with(Constraint::Named(label.into()))
    }

    /// Attach an external field name
    pub fn keyed(self, external_key: impl Into<String>) -> Self {
        self.with(Constraint::Keyed(external_key.into()))
    }

    /// Append a raw constraint
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_optional(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, Constraint::Optional))
    }

    /// Default value; the last one declared wins
    pub fn default_value(&self) -> Option<&Value> {
        self.constraints.iter().rev().find_map(|c| match c {
            Constraint::Default(value) => Some(value),
            _ => None,
        })
    }

    /// All regex patterns in declaration order
    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::Regex(pattern) => Some(pattern),
            _ => None,
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.constraints.iter().rev().find_map(|c| match c {
            Constraint::Named(label) => Some(label.as_str()),
            _ => None,
        })
    }

    pub fn external_key(&self) -> Option<&str> {
        self.constraints.iter().rev().find_map(|c| match c {
            Constraint::Keyed(key) => Some(key.as_str()),
            _ => None,
        })
    }
}

/// Schema tree node
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Leaf(Property),
    Group(Schema),
}

/// Ordered schema tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    entries: Vec<(String, SchemaNode)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf property
    pub fn field(mut self, key: impl Into<String>, property: Property) -> Self {
        self.insert(key, SchemaNode::Leaf(property));
        self
    }

    /// Add a nested schema
    pub fn group(mut self, key: impl Into<String>, schema: Schema) -> Self {
        self.insert(key, SchemaNode::Group(schema));
        self
    }

    /// Insert a node, replacing an existing node with the same key in place
    pub fn insert(&mut self, key: impl Into<String>, node: SchemaNode) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SchemaNode> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }

    /// Overlay `other` on top of this schema.
    ///
    /// Groups present on both sides are merged recursively; any other
    /// collision is resolved in favour of `other`.
    pub fn merge(mut self, other: Schema) -> Schema {
        for (key, node) in other.entries {
            let merged = match (self.entries.iter().position(|(k, _)| *k == key), node) {
                (Some(index), SchemaNode::Group(theirs)) => match &self.entries[index].1 {
                    SchemaNode::Group(ours) => SchemaNode::Group(ours.clone().merge(theirs)),
                    SchemaNode::Leaf(_) => SchemaNode::Group(theirs),
                },
                (_, node) => node,
            };
            self.insert(key, merged);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
