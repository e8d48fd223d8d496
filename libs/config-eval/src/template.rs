//! Config template parsing
//!
//! Templates are plain JSON. Leaves come in two forms:
//!
//! - a property expression string: a type name followed by chained
//!   constraint calls, e.g. `"string.regex(/(\d+)/).optional().keyed('CFBundleVersion')"`.
//!   Calls are `optional()`, `default(x)`, `regex(/p/)`, `named('l')` and `keyed('k')`;
//! - an attribute object whose `"type"` member is an expression and whose other
//!   members are the attributes `optional`, `default`, `regex`, `name`, `key`.
//!
//! An object whose members are all expressions or objects is a nested group,
//! even when one of its fields is called `type`:
//!
//! ```json
//! {
//!     "bundleId": { "type": "string", "regex": "^[a-z.]+$", "key": "CFBundleIdentifier" },
//!     "api": {
//!         "url": "string.named('API endpoint')",
//!         "timeout": "number.default(30)"
//!     }
//! }
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::{Constraint, Pattern, Property, Schema, SchemaNode, ValueType};

/// Template parsing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template must be a JSON object")]
    NotAnObject,

    #[error("{path}: unknown type '{type_name}'")]
    UnknownType { path: String, type_name: String },

    #[error("{path}: invalid expression '{expression}': {reason}")]
    InvalidExpression {
        path: String,
        expression: String,
        reason: String,
    },

    #[error("{path}: invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        path: String,
        attribute: String,
        reason: String,
    },

    #[error("{path}: unsupported template entry")]
    InvalidEntry { path: String },
}

/// Parse a template into a schema
pub fn parse_template(template: &Value) -> Result<Schema, TemplateError> {
    match template {
        Value::Object(members) => parse_group(members, ""),
        _ => Err(TemplateError::NotAnObject),
    }
}

fn parse_group(members: &Map<String, Value>, prefix: &str) -> Result<Schema, TemplateError> {
    let mut schema = Schema::new();
    for (key, value) in members {
        let path = crate::join_path(prefix, key);
        let node = match value {
            Value::String(expression) => SchemaNode::Leaf(parse_expression(expression, &path)?),
            Value::Object(attrs) if is_attribute_leaf(attrs) => SchemaNode::Leaf(parse_leaf(attrs, &path)?),
            Value::Object(children) => SchemaNode::Group(parse_group(children, &path)?),
            _ => return Err(TemplateError::InvalidEntry { path }),
        };
        schema.insert(key.clone(), node);
    }
    Ok(schema)
}

/// An object with a string `type` that cannot be read as a group
fn is_attribute_leaf(members: &Map<String, Value>) -> bool {
    let reads_as_group = members.iter().all(|(key, value)| match value {
        Value::String(expression) => parse_expression(expression, key).is_ok(),
        Value::Object(_) => true,
        _ => false,
    });
    members.get("type").is_some_and(Value::is_string) && !reads_as_group
}

fn parse_leaf(attrs: &Map<String, Value>, path: &str) -> Result<Property, TemplateError> {
    let expression = attrs.get("type").and_then(Value::as_str).unwrap_or_default();
    let mut property = parse_expression(expression, path)?;

    for (attribute, value) in attrs {
        let invalid = |reason: &str| TemplateError::InvalidAttribute {
            path: path.to_string(),
            attribute: attribute.clone(),
            reason: reason.to_string(),
        };

        property = match attribute.as_str() {
            "type" => property,
            "optional" => match value.as_bool() {
                Some(true) => property.optional(),
                Some(false) => property,
                None => return Err(invalid("expected a boolean")),
            },
            "default" => property.default(value.clone()),
            "regex" => {
                let pattern = Pattern::new(value.as_str().ok_or_else(|| invalid("expected a string"))?);
                if let Some(error) = pattern.error() {
                    return Err(invalid(error));
                }
                property.with(Constraint::Regex(pattern))
            }
            "name" => property.named(value.as_str().ok_or_else(|| invalid("expected a string"))?),
            "key" => property.keyed(value.as_str().ok_or_else(|| invalid("expected a string"))?),
            _ => return Err(invalid("unknown attribute")),
        };
    }

    Ok(property)
}

/// Parse a property expression such as `string.optional().named('Label')`
pub fn parse_expression(expression: &str, path: &str) -> Result<Property, TemplateError> {
    let invalid = |reason: String| TemplateError::InvalidExpression {
        path: path.to_string(),
        expression: expression.to_string(),
        reason,
    };

    let mut cursor = Cursor::new(expression);
    cursor.skip_whitespace();
    let type_name = cursor.ident();
    let value_type = ValueType::from_name(&type_name).ok_or_else(|| TemplateError::UnknownType {
        path: path.to_string(),
        type_name: if type_name.is_empty() {
            expression.to_string()
        } else {
            type_name.clone()
        },
    })?;
    let mut property = Property::new(value_type);

    loop {
        cursor.skip_whitespace();
        match cursor.bump() {
            None => return Ok(property),
            Some('.') => {}
            Some(c) => return Err(invalid(format!("unexpected '{}'", c))),
        }
        cursor.skip_whitespace();
        let method = cursor.ident();
        cursor.skip_whitespace();
        cursor.expect('(').map_err(&invalid)?;
        let argument = cursor.argument().map_err(&invalid)?;
        property = apply_call(property, &method, argument).map_err(&invalid)?;
    }
}

/// Argument of a constraint call
#[derive(Debug)]
enum Argument {
    None,
    Text(String),
    Pattern(String),
    Literal(Value),
}

fn apply_call(property: Property, method: &str, argument: Argument) -> Result<Property, String> {
    match (method, argument) {
        ("optional", Argument::None) => Ok(property.optional()),
        ("default", Argument::Text(text)) => Ok(property.default(text)),
        ("default", Argument::Literal(value)) => Ok(property.default(value)),
        ("regex", Argument::Pattern(source) | Argument::Text(source)) => {
            let pattern = Pattern::new(source);
            match pattern.error() {
                Some(error) => Err(error.to_string()),
                None => Ok(property.with(Constraint::Regex(pattern))),
            }
        }
        ("named", Argument::Text(label)) => Ok(property.named(label)),
        ("keyed", Argument::Text(key)) => Ok(property.keyed(key)),
        ("optional" | "default" | "regex" | "named" | "keyed", argument) => {
            Err(format!("{}() does not take {:?}", method, argument))
        }
        (other, _) => Err(format!("unknown call '{}'", other)),
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected '{}' but found '{}'", expected, c)),
            None => Err(format!("expected '{}' but reached the end", expected)),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            ident.push(c);
            self.pos += 1;
        }
        ident
    }

    /// Read a call argument and its closing parenthesis
    fn argument(&mut self) -> Result<Argument, String> {
        self.skip_whitespace();
        let argument = match self.peek() {
            Some(')') => Argument::None,
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                Argument::Text(self.quoted(quote)?)
            }
            Some('/') => {
                self.pos += 1;
                Argument::Pattern(self.pattern()?)
            }
            Some(_) => Argument::Literal(self.literal()?),
            None => return Err("unterminated call".to_string()),
        };
        self.skip_whitespace();
        self.expect(')')?;
        Ok(argument)
    }

    fn quoted(&mut self, quote: char) -> Result<String, String> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => text.push(c),
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) if c == quote => return Ok(text),
                Some(c) => text.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    /// Body and flags of a `/pattern/flags` literal
    fn pattern(&mut self) -> Result<String, String> {
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('/') => body.push('/'),
                    Some(c) => {
                        body.push('\\');
                        body.push(c);
                    }
                    None => return Err("unterminated pattern".to_string()),
                },
                Some('/') => break,
                Some(c) => body.push(c),
                None => return Err("unterminated pattern".to_string()),
            }
        }

        let mut flags = String::new();
        for flag in self.ident().chars() {
            match flag {
                'i' | 'm' | 's' => flags.push(flag),
                'g' => {}
                other => return Err(format!("unsupported pattern flag '{}'", other)),
            }
        }
        Ok(if flags.is_empty() {
            body
        } else {
            format!("(?{}){}", flags, body)
        })
    }

    fn literal(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != ')') {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => Ok(value),
            _ => Err(format!("unsupported literal '{}'", raw.trim())),
        }
    }
}
