//! Surface property model.
//!
//! # Responsibility
//! - Represent the initial property set passed once to a new module instance.
//! - Convert host JSON objects into typed, ordered property values.
//!
//! # Invariants
//! - Keys are unique within one `PropertySet`; insertion order is preserved.
//! - A `PropertySet` is immutable after construction.
//! - `null` is not a representable property value.

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    String(String),
    Number(f64),
    Bool(bool),
    Map(PropertySet),
    List(Vec<PropValue>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertySet> {
        match self {
            Self::Map(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropValue]> {
        match self {
            Self::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    fn from_json(path: &str, value: Value) -> Result<Self, PropertyError> {
        match value {
            Value::Null => Err(PropertyError::NullValue(path.to_string())),
            Value::Bool(flag) => Ok(Self::Bool(flag)),
            Value::Number(number) => number
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| PropertyError::UnrepresentableNumber(path.to_string())),
            Value::String(text) => Ok(Self::String(text)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| Self::from_json(&format!("{path}[{index}]"), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(object) => {
                let mut nested = PropertySet::new();
                for (key, item) in object {
                    let child_path = format!("{path}.{key}");
                    let child = Self::from_json(&child_path, item)?;
                    nested.insert(key, child)?;
                }
                Ok(Self::Map(nested))
            }
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PropertySet> for PropValue {
    fn from(value: PropertySet) -> Self {
        Self::Map(value)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(value: Vec<PropValue>) -> Self {
        Self::List(value)
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(value) => serializer.serialize_str(value),
            Self::Number(value) => serializer.serialize_f64(*value),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Map(value) => value.serialize(serializer),
            Self::List(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

/// Ordered string-keyed property mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet {
    entries: Vec<(String, PropValue)>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used by hosts and tests.
    ///
    /// # Errors
    /// - Returns `DuplicateKey` when `key` is already present.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropValue>,
    ) -> Result<Self, PropertyError> {
        self.insert(key.into(), value.into())?;
        Ok(self)
    }

    /// Parses a JSON object string.
    ///
    /// Decodes straight from the token stream, so a key repeated within one
    /// object is reported as `DuplicateKey` instead of the last value winning.
    pub fn from_json_str(raw: &str) -> Result<Self, PropertyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }
        if !trimmed.starts_with('{') {
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(_) => Err(PropertyError::NotAnObject),
                Err(err) => Err(PropertyError::InvalidJson(err.to_string())),
            };
        }

        let fault = RefCell::new(None);
        let mut deserializer = serde_json::Deserializer::from_str(trimmed);
        let parsed = ValueSeed {
            path: "$".to_string(),
            fault: &fault,
        }
        .deserialize(&mut deserializer)
        .and_then(|value| deserializer.end().map(|()| value));

        match parsed {
            Ok(PropValue::Map(set)) => Ok(set),
            Ok(_) => Err(PropertyError::NotAnObject),
            Err(err) => Err(fault
                .into_inner()
                .unwrap_or_else(|| PropertyError::InvalidJson(err.to_string()))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, value: PropValue) -> Result<(), PropertyError> {
        if self.get(key.as_str()).is_some() {
            return Err(PropertyError::DuplicateKey(key));
        }
        self.entries.push((key, value));
        Ok(())
    }
}

impl TryFrom<Value> for PropertySet {
    type Error = PropertyError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(_) => match PropValue::from_json("$", value)? {
                PropValue::Map(set) => Ok(set),
                _ => Err(PropertyError::NotAnObject),
            },
            _ => Err(PropertyError::NotAnObject),
        }
    }
}

/// Streaming decoder for one property value at `path`.
///
/// Domain failures are parked in `fault` so the caller can return the typed
/// `PropertyError` rather than the serde message.
struct ValueSeed<'a> {
    path: String,
    fault: &'a RefCell<Option<PropertyError>>,
}

impl ValueSeed<'_> {
    fn child(&self, path: String) -> ValueSeed<'_> {
        ValueSeed {
            path,
            fault: self.fault,
        }
    }

    fn fail<E: de::Error>(&self, err: PropertyError) -> E {
        let message = err.to_string();
        *self.fault.borrow_mut() = Some(err);
        E::custom(message)
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = PropValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<PropValue, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = PropValue;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "a non-null json value at {}", self.path)
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<PropValue, E> {
        Ok(PropValue::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<PropValue, E> {
        Ok(PropValue::Number(value as f64))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<PropValue, E> {
        Ok(PropValue::Number(value as f64))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<PropValue, E> {
        if !value.is_finite() {
            return Err(self.fail(PropertyError::UnrepresentableNumber(self.path.clone())));
        }
        Ok(PropValue::Number(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<PropValue, E> {
        Ok(PropValue::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<PropValue, E> {
        Ok(PropValue::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<PropValue, E> {
        Err(self.fail(PropertyError::NullValue(self.path.clone())))
    }

    fn visit_none<E: de::Error>(self) -> Result<PropValue, E> {
        self.visit_unit()
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PropValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) =
            seq.next_element_seed(self.child(format!("{}[{}]", self.path, items.len())))?
        {
            items.push(item);
        }
        Ok(PropValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PropValue, A::Error> {
        let mut nested = PropertySet::new();
        while let Some(key) = map.next_key::<String>()? {
            let child = map.next_value_seed(self.child(format!("{}.{key}", self.path)))?;
            if let Err(err) = nested.insert(key, child) {
                return Err(self.fail(err));
            }
        }
        Ok(PropValue::Map(nested))
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Property set construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    InvalidJson(String),
    NotAnObject,
    NullValue(String),
    UnrepresentableNumber(String),
    DuplicateKey(String),
}

impl Display for PropertyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(detail) => write!(f, "property json is invalid: {detail}"),
            Self::NotAnObject => write!(f, "property root must be a json object"),
            Self::NullValue(path) => write!(f, "property value must not be null: {path}"),
            Self::UnrepresentableNumber(path) => {
                write!(f, "property number is not representable: {path}")
            }
            Self::DuplicateKey(key) => write!(f, "property key is duplicated: {key}"),
        }
    }
}

impl Error for PropertyError {}

#[cfg(test)]
mod tests {
    use super::{PropValue, PropertyError, PropertySet};

    #[test]
    fn preserves_insertion_order_from_json() {
        let props = PropertySet::from_json_str(r#"{"zeta": 1, "alpha": true, "mid": "x"}"#)
            .expect("object should parse");
        let keys: Vec<&str> = props.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn parses_nested_maps_and_lists() {
        let props =
            PropertySet::from_json_str(r#"{"style": {"fontSize": 12}, "items": ["a", 2, false]}"#)
                .expect("nested object should parse");

        let style = props
            .get("style")
            .and_then(PropValue::as_map)
            .expect("style map");
        assert_eq!(style.get("fontSize").and_then(PropValue::as_f64), Some(12.0));

        let items = props
            .get("items")
            .and_then(PropValue::as_list)
            .expect("items list");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_str(), Some("a"));
        assert_eq!(items[2].as_bool(), Some(false));
    }

    #[test]
    fn rejects_null_values_with_path() {
        let err = PropertySet::from_json_str(r#"{"style": {"color": null}}"#)
            .expect_err("null must be rejected");
        assert_eq!(err, PropertyError::NullValue("$.style.color".to_string()));
    }

    #[test]
    fn rejects_non_object_root() {
        let err = PropertySet::from_json_str("[1, 2]").expect_err("array root must fail");
        assert_eq!(err, PropertyError::NotAnObject);
    }

    #[test]
    fn blank_input_is_an_empty_set() {
        let props = PropertySet::from_json_str("  ").expect("blank input");
        assert!(props.is_empty());
    }

    #[test]
    fn json_rejects_duplicate_keys() {
        let err = PropertySet::from_json_str(r#"{"fontSize": 12, "fontSize": 14}"#)
            .expect_err("duplicate key must fail");
        assert_eq!(err, PropertyError::DuplicateKey("fontSize".to_string()));

        let nested = PropertySet::from_json_str(r#"{"style": {"color": "red", "color": "blue"}}"#)
            .expect_err("nested duplicate key must fail");
        assert_eq!(nested, PropertyError::DuplicateKey("color".to_string()));
    }

    #[test]
    fn same_key_in_sibling_maps_is_allowed() {
        let props = PropertySet::from_json_str(
            r#"{"header": {"color": "red"}, "footer": {"color": "blue"}}"#,
        )
        .expect("sibling maps parse");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn reports_null_inside_lists_with_index() {
        let err = PropertySet::from_json_str(r#"{"items": ["a", null]}"#)
            .expect_err("null must be rejected");
        assert_eq!(err, PropertyError::NullValue("$.items[1]".to_string()));
    }

    #[test]
    fn malformed_json_is_invalid_json() {
        let err = PropertySet::from_json_str(r#"{"title": "Clock""#).expect_err("truncated");
        assert!(matches!(err, PropertyError::InvalidJson(_)));

        let trailing = PropertySet::from_json_str(r#"{"title": "Clock"} {}"#)
            .expect_err("trailing input");
        assert!(matches!(trailing, PropertyError::InvalidJson(_)));
    }

    #[test]
    fn converts_from_json_value() {
        let value = serde_json::json!({"title": "Clock", "style": {"fontSize": 12}});
        let props = PropertySet::try_from(value).expect("value converts");
        assert_eq!(props.get("title").and_then(PropValue::as_str), Some("Clock"));
        assert!(PropertySet::try_from(serde_json::json!(3)).is_err());
    }

    #[test]
    fn builder_rejects_duplicate_keys() {
        let err = PropertySet::new()
            .with("fontSize", 12_i64)
            .and_then(|props| props.with("fontSize", 14_i64))
            .expect_err("duplicate key must fail");
        assert_eq!(err, PropertyError::DuplicateKey("fontSize".to_string()));
    }

    #[test]
    fn serializes_back_to_ordered_json() {
        let props = PropertySet::new()
            .with("title", "Clock")
            .and_then(|props| props.with("visible", true))
            .expect("builder");
        let json = serde_json::to_string(&props).expect("serialize");
        assert_eq!(json, r#"{"title":"Clock","visible":true}"#);
    }
}
