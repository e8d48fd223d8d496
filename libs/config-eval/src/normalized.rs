//! Normalized configuration values

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A normalized leaf: the value plus the names consumers write it under
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedValue {
    /// Normalized value, `None` when an optional field was absent
    pub value: Option<Value>,

    /// External field name (the schema key unless the property was keyed)
    pub key: String,

    /// Display label
    pub name: Option<String>,
}

impl NormalizedValue {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }
}

/// A node of a normalized tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Normalized {
    Value(NormalizedValue),
    Group(NormalizedConfig),
}

/// Normalized configuration tree, ordered like its schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedConfig {
    entries: Vec<(String, Normalized)>,
}

impl NormalizedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, node: Normalized) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Normalized> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Normalized)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }

    /// Look up a leaf by dotted schema path, e.g. `"project.solutionPath"`
    pub fn value(&self, path: &str) -> Option<&NormalizedValue> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (current.get(segment)?, segments.peek()) {
                (Normalized::Value(leaf), None) => return Some(leaf),
                (Normalized::Group(group), Some(_)) => current = group,
                _ => return None,
            }
        }
        None
    }

    /// Look up a nested group by dotted schema path
    pub fn group(&self, path: &str) -> Option<&NormalizedConfig> {
        path.split('.').try_fold(self, |current, segment| match current.get(segment)? {
            Normalized::Group(group) => Some(group),
            Normalized::Value(_) => None,
        })
    }

    /// String value at a dotted path
    pub fn str(&self, path: &str) -> Option<&str> {
        self.value(path).and_then(NormalizedValue::as_str)
    }

    /// All leaves, depth first, with their dotted schema paths
    pub fn leaves(&self) -> Vec<(String, &NormalizedValue)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a NormalizedValue)>) {
        for (key, node) in &self.entries {
            let path = crate::join_path(prefix, key);
            match node {
                Normalized::Value(leaf) => out.push((path, leaf)),
                Normalized::Group(group) => group.collect_leaves(&path, out),
            }
        }
    }

    /// Plain JSON shaped like the raw input. Absent optional values are omitted.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (key, node) in &self.entries {
            match node {
                Normalized::Value(NormalizedValue { value: Some(v), .. }) => {
                    map.insert(key.clone(), v.clone());
                }
                Normalized::Value(_) => {}
                Normalized::Group(group) => {
                    map.insert(key.clone(), group.to_value());
                }
            }
        }
        Value::Object(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for NormalizedConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}
