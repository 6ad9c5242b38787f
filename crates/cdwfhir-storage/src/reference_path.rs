//! Reference field declarations expressed as data.
//!
//! Each mapper declares which fields of its resource hold FHIR `Reference`
//! objects. A [`ReferencePath`] is a dotted path (`subject`,
//! `participant.individual`) that is walked through objects and
//! transparently through arrays; every node it reaches is a Reference whose
//! `reference` string may need rewriting before the resource is persisted.

use std::fmt;

use cdwfhir_core::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dotted path to the Reference-typed field(s) of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferencePath {
    segments: Vec<String>,
}

impl ReferencePath {
    /// Parses a dotted path such as `performer` or `participant.individual`.
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(CoreError::invalid_reference("empty reference path"));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::invalid_reference(format!(
                "empty segment in reference path '{path}'"
            )));
        }
        Ok(Self { segments })
    }

    /// Returns the `reference` strings found at this path, in document order.
    pub fn collect(&self, resource: &Value) -> Vec<String> {
        let mut found = Vec::new();
        collect_at(resource, &self.segments, &mut found);
        found
    }

    /// Replaces every `reference` string at this path for which `replace`
    /// returns a new value. Returns the number of strings rewritten.
    pub fn rewrite<F>(&self, resource: &mut Value, replace: &mut F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        rewrite_at(resource, &self.segments, replace)
    }
}

fn collect_at(value: &Value, segments: &[String], found: &mut Vec<String>) {
    if let Value::Array(items) = value {
        for item in items {
            collect_at(item, segments, found);
        }
        return;
    }
    match segments.split_first() {
        None => {
            if let Some(reference) = value.get("reference").and_then(Value::as_str) {
                found.push(reference.to_string());
            }
        }
        Some((head, rest)) => {
            if let Some(child) = value.get(head.as_str()) {
                collect_at(child, rest, found);
            }
        }
    }
}

fn rewrite_at<F>(value: &mut Value, segments: &[String], replace: &mut F) -> usize
where
    F: FnMut(&str) -> Option<String>,
{
    if let Value::Array(items) = value {
        return items
            .iter_mut()
            .map(|item| rewrite_at(item, segments, replace))
            .sum();
    }
    match segments.split_first() {
        None => {
            let Some(slot) = value.get_mut("reference") else {
                return 0;
            };
            let Some(current) = slot.as_str() else {
                return 0;
            };
            match replace(current) {
                Some(new_value) => {
                    *slot = Value::String(new_value);
                    1
                }
                None => 0,
            }
        }
        Some((head, rest)) => match value.get_mut(head.as_str()) {
            Some(child) => rewrite_at(child, rest, replace),
            None => 0,
        },
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl TryFrom<String> for ReferencePath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReferencePath> for String {
    fn from(path: ReferencePath) -> Self {
        path.to_string()
    }
}
