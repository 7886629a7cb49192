//! The store's typed attribute value and its conversion to and from JSON.
//!
//! Payloads are serialized with serde into a JSON object and then mapped onto
//! attribute values: numbers become `N` (kept as their decimal text), strings
//! `S`, arrays `L`, objects `M`. Binary and set shapes never come out of that
//! mapping; they can only be constructed directly.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::EncodingError;

/// A map of attribute name to value. Ordered, so rendering and diffing are
/// deterministic.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A typed value in the store's native format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "B")]
    B(Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null,
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "M")]
    M(Attributes),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<Vec<u8>>),
}

impl AttributeValue {
    /// The store's type descriptor for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null => "NULL",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
        }
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    /// Binary and set shapes.
    pub fn is_binary_or_set(&self) -> bool {
        matches!(
            self,
            AttributeValue::B(_)
                | AttributeValue::Ss(_)
                | AttributeValue::Ns(_)
                | AttributeValue::Bs(_)
        )
    }

    /// Map a JSON value onto an attribute value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => AttributeValue::N(n.to_string()),
            Value::String(s) => AttributeValue::S(s),
            Value::Array(items) => {
                AttributeValue::L(items.into_iter().map(AttributeValue::from_json).collect())
            }
            Value::Object(map) => AttributeValue::M(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Map an attribute value back onto JSON.
    ///
    /// Binary values become arrays of byte numbers and sets become arrays.
    pub fn to_json(&self) -> Result<Value, EncodingError> {
        Ok(match self {
            AttributeValue::S(s) => Value::String(s.clone()),
            AttributeValue::N(n) => Value::Number(parse_number(n)?),
            AttributeValue::B(bytes) => bytes_to_json(bytes),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Null => Value::Null,
            AttributeValue::L(items) => Value::Array(
                items
                    .iter()
                    .map(AttributeValue::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            AttributeValue::M(map) => Value::Object(attributes_to_json(map)?),
            AttributeValue::Ss(strings) => {
                Value::Array(strings.iter().cloned().map(Value::String).collect())
            }
            AttributeValue::Ns(numbers) => Value::Array(
                numbers
                    .iter()
                    .map(|n| parse_number(n).map(Value::Number))
                    .collect::<Result<_, _>>()?,
            ),
            AttributeValue::Bs(values) => {
                Value::Array(values.iter().map(|b| bytes_to_json(b)).collect())
            }
        })
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::N(value.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::N(value.to_string())
    }
}

fn parse_number(text: &str) -> Result<Number, EncodingError> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Ok(Number::from(u));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| EncodingError::InvalidNumber(text.to_string()))
}

fn bytes_to_json(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

fn attributes_to_json(attributes: &Attributes) -> Result<Map<String, Value>, EncodingError> {
    attributes
        .iter()
        .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialize a payload into an attribute map.
///
/// The payload must serialize to a JSON object; each top-level field becomes
/// one attribute.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Attributes, EncodingError> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, AttributeValue::from_json(v)))
            .collect()),
        other => Err(EncodingError::PayloadNotAMap(json_type_name(&other))),
    }
}

/// Deserialize a payload from an attribute map.
pub fn decode_payload<T: DeserializeOwned>(attributes: &Attributes) -> Result<T, EncodingError> {
    let object = attributes_to_json(attributes)?;
    Ok(serde_json::from_value(Value::Object(object))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        name: String,
        quantity: u32,
        price: f64,
        tags: Vec<String>,
        note: Option<String>,
    }

    #[test]
    fn test_payload_roundtrip() {
        let order = Order {
            name: "widget".to_string(),
            quantity: 3,
            price: 9.5,
            tags: vec!["a".to_string(), "b".to_string()],
            note: None,
        };
        let attributes = encode_payload(&order).unwrap();
        assert_eq!(attributes["quantity"], AttributeValue::N("3".to_string()));
        assert_eq!(attributes["note"], AttributeValue::Null);
        let decoded: Order = decode_payload(&attributes).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_non_map_payload_rejected() {
        let err = encode_payload(&"just a string").unwrap_err();
        assert!(matches!(err, EncodingError::PayloadNotAMap("string")));
    }

    #[test]
    fn test_nested_json_mapping() {
        let value = AttributeValue::from_json(json!({"a": [1, {"b": true}], "c": null}));
        let AttributeValue::M(map) = &value else {
            panic!("expected map");
        };
        assert_eq!(
            map["a"],
            AttributeValue::L(vec![
                AttributeValue::N("1".to_string()),
                AttributeValue::M(
                    [("b".to_string(), AttributeValue::Bool(true))]
                        .into_iter()
                        .collect()
                ),
            ])
        );
        assert_eq!(
            value.to_json().unwrap(),
            json!({"a": [1, {"b": true}], "c": null})
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = AttributeValue::N("twelve".to_string()).to_json().unwrap_err();
        assert!(matches!(err, EncodingError::InvalidNumber(_)));
    }

    #[test]
    fn test_sets_decode_as_arrays() {
        let ns = AttributeValue::Ns(vec!["1".to_string(), "2.5".to_string()]);
        assert_eq!(ns.to_json().unwrap(), json!([1, 2.5]));
        let bs = AttributeValue::Bs(vec![vec![1, 2]]);
        assert_eq!(bs.to_json().unwrap(), json!([[1, 2]]));
        assert!(bs.is_binary_or_set());
        assert!(!AttributeValue::S("x".to_string()).is_binary_or_set());
    }

    #[test]
    fn test_wire_format_is_type_tagged() {
        let value = AttributeValue::S("hello".to_string());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"S": "hello"}));
        let back: AttributeValue = serde_json::from_value(json!({"N": "42"})).unwrap();
        assert_eq!(back, AttributeValue::N("42".to_string()));
    }
}
