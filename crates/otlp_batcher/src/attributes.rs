//! Attribute model shared by resources and records.
//!
//! [`Attributes`] is an immutable key/value bag. It is assembled through
//! [`AttributesBuilder`] and combined with [`Attributes::merge`], where the
//! overlay shadows the base on key collision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(v) => f.write_str(v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// Immutable set of attributes.
///
/// Iteration is ordered by key, which keeps encoded payloads deterministic;
/// no caller should rely on that order for meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    entries: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    /// An empty attribute set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> AttributesBuilder {
        AttributesBuilder::default()
    }

    /// Returns a new set with every entry of `base` and `overlay`.
    /// Keys present in both take the overlay's value.
    pub fn merge(base: &Attributes, overlay: &Attributes) -> Attributes {
        let mut entries = base.entries.clone();
        for (key, value) in &overlay.entries {
            entries.insert(key.clone(), value.clone());
        }
        Attributes { entries }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(AttributeValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.entries.get(key) {
            Some(AttributeValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(AttributeValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Accumulating builder for [`Attributes`]. Later puts replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct AttributesBuilder {
    entries: BTreeMap<String, AttributeValue>,
}

impl AttributesBuilder {
    pub fn put(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Copies every entry of `attributes` into the builder.
    pub fn put_all(mut self, attributes: &Attributes) -> Self {
        for (key, value) in &attributes.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn build(self) -> Attributes {
        Attributes {
            entries: self.entries,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Attributes {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_typed_getters() {
        let attrs = Attributes::builder()
            .put("user.id", "u-42")
            .put("retries", 3)
            .put("bytes", 9_000_000_000i64)
            .put("ratio", 0.5)
            .put("premium", true)
            .build();

        assert_eq!(attrs.len(), 5);
        assert_eq!(attrs.get_str("user.id"), Some("u-42"));
        assert_eq!(attrs.get_int("retries"), Some(3));
        assert_eq!(attrs.get_int("bytes"), Some(9_000_000_000));
        assert_eq!(attrs.get_double("ratio"), Some(0.5));
        assert_eq!(attrs.get_bool("premium"), Some(true));

        // Wrong type is not coerced
        assert_eq!(attrs.get_int("user.id"), None);
        assert_eq!(attrs.get_str("missing"), None);
    }

    #[test]
    fn test_merge_overlay_wins() {
        let common = Attributes::builder()
            .put("session.id", "s-1")
            .put("env", "prod")
            .build();
        let call = Attributes::builder()
            .put("env", "staging")
            .put("route", "/cart")
            .build();

        let merged = Attributes::merge(&common, &call);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get_str("env"), Some("staging"));
        assert_eq!(merged.get_str("session.id"), Some("s-1"));
        assert_eq!(merged.get_str("route"), Some("/cart"));

        // Inputs are untouched
        assert_eq!(common.get_str("env"), Some("prod"));
        assert!(!common.contains_key("route"));
    }

    #[test]
    fn test_put_all_then_override() {
        let base = Attributes::builder().put("a", 1).put("b", 2).build();
        let attrs = Attributes::builder().put_all(&base).put("b", "two").build();

        assert_eq!(attrs.get_int("a"), Some(1));
        assert_eq!(attrs.get_str("b"), Some("two"));
    }

    #[test]
    fn test_serde_untagged_values() {
        let attrs = Attributes::builder()
            .put("name", "checkout")
            .put("count", 2)
            .put("ok", false)
            .build();

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(json, r#"{"count":2,"name":"checkout","ok":false}"#);

        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
