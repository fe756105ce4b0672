//! Core data types for wirecanvas
//!
//! This module contains the small value types shared by every subsystem:
//! object identifiers, dynamically-typed property values, the partial property
//! maps that flow through the propagation engine, and connection status.
//!
//! # Main Types
//!
//! - [`ObjectId`] - Identifier of one object in the store
//! - [`PropertyValue`] - A single property value (number, text, bool or null)
//! - [`PropertyMap`] - A partial set of property writes for one object
//! - [`ConnectionStatus`] - Lifecycle of a bridge's serial connection
//! - [`Theme`] - Canvas theme persisted alongside the objects

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an object in the store.
///
/// Identifiers are generated by the UI collaborator and are unique within a
/// store. Bindings hold them as plain references; a dangling id is inert.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A dynamically-typed property value.
///
/// Writes into the engine carry these; typed object fields accept the
/// variants that make sense for them and ignore the rest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Numeric view of this value. Text is parsed strictly; non-finite results are rejected.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) if n.is_finite() => Some(*n),
            PropertyValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Null => serializer.serialize_unit(),
            PropertyValue::Bool(b) => serializer.serialize_bool(*b),
            PropertyValue::Number(n) => number::serialize(n, serializer),
            PropertyValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<&ObjectId> for PropertyValue {
    fn from(v: &ObjectId) -> Self {
        PropertyValue::Text(v.0.clone())
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

/// Parse a numeric literal the way switch literals are parsed: trimmed, strict, finite.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A partial set of property writes addressed to one object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, PropertyValue>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-entry map, the common shape of an implied write.
    pub fn single(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let mut map = Self::new();
        map.insert(key, value);
        map
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>, const N: usize> From<[(K, V); N]> for PropertyMap {
    fn from(entries: [(K, V); N]) -> Self {
        let mut map = Self::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }
}

/// Represents the connection status of a bridge's serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not connected
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection error occurred; reverts to disconnected after a delay
    Error,
}

impl ConnectionStatus {
    /// Wire/property name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(ConnectionStatus::Disconnected),
            "connecting" => Some(ConnectionStatus::Connecting),
            "connected" => Some(ConnectionStatus::Connected),
            "error" => Some(ConnectionStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Canvas theme stored in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub name: String,
    pub background_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "light".to_string(),
            background_color: "#ffffff".to_string(),
        }
    }
}

/// Serde helpers that write integral floats as JSON integers.
///
/// Snapshots are edited by hand and by the UI; writing `5` back as `5.0`
/// would make every load/save cycle rewrite the file.
pub mod number {
    use serde::Serializer;

    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_EXACT {
            serializer.serialize_i64(*value as i64)
        } else {
            serializer.serialize_f64(*value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_as_number() {
        assert_eq!(PropertyValue::Number(2.5).as_number(), Some(2.5));
        assert_eq!(PropertyValue::Text(" 42 ".into()).as_number(), Some(42.0));
        assert_eq!(PropertyValue::Text("on".into()).as_number(), None);
        assert_eq!(PropertyValue::Text("NaN".into()).as_number(), None);
        assert_eq!(PropertyValue::Bool(true).as_number(), None);
        assert_eq!(PropertyValue::Null.as_number(), None);
    }

    #[test]
    fn test_property_value_json_shape() {
        let map = PropertyMap::new()
            .with("a", 5.0)
            .with("b", 0.25)
            .with("c", "text")
            .with("d", PropertyValue::Null)
            .with("e", true);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"a":5,"b":0.25,"c":"text","d":null,"e":true}"#);

        let back: PropertyMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_property_map_from_array() {
        let map = PropertyMap::from([("value", 3.0), ("min", 0.0)]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("value"), Some(&PropertyValue::Number(3.0)));
        assert!(!map.contains_key("max"));
    }

    #[test]
    fn test_connection_status_names() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Error,
        ] {
            assert_eq!(ConnectionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConnectionStatus::parse("bogus"), None);
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connecting).unwrap(),
            "\"connecting\""
        );
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1"), Some(1.0));
        assert_eq!(parse_number("-0.5"), Some(-0.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("inf"), None);
    }
}
