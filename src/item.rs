//! Conversion between records and DynamoDB items
//!
//! Records go through `serde_json::Value`: objects become maps, numbers become `N` values,
//! arrays become lists. Anything `serde` can serialize to a JSON object can be stored.

use crate::error::{Error, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// A DynamoDB item: attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// Serializes a record into an item. The record must serialize to a JSON object.
pub fn to_item<T: Serialize + ?Sized>(record: &T) -> Result<Item> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| (name, to_attribute_value(value)))
            .collect()),
        other => Err(Error::Mapping(format!(
            "records must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Deserializes a record from an item
pub fn from_item<T: DeserializeOwned>(item: Item) -> Result<T> {
    let mut fields = Map::new();
    for (name, value) in item {
        let value = from_attribute_value(value)
            .map_err(|e| Error::Mapping(format!("attribute {}: {}", name, e)))?;
        fields.insert(name, value);
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::Mapping(format!("Error deserializing item: {}", e)))
}

/// Converts a JSON value into an attribute value
pub fn to_attribute_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => {
            AttributeValue::L(values.into_iter().map(to_attribute_value).collect())
        }
        Value::Object(fields) => AttributeValue::M(
            fields
                .into_iter()
                .map(|(name, value)| (name, to_attribute_value(value)))
                .collect(),
        ),
    }
}

/// Converts an attribute value into a JSON value
pub fn from_attribute_value(value: AttributeValue) -> Result<Value> {
    let converted = match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(n) => Value::Number(parse_number(&n)?),
        AttributeValue::B(blob) => bytes_to_json(blob.as_ref()),
        AttributeValue::Ss(values) => Value::Array(values.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::Bs(values) => Value::Array(
            values
                .iter()
                .map(|blob| bytes_to_json(blob.as_ref()))
                .collect(),
        ),
        AttributeValue::L(values) => Value::Array(
            values
                .into_iter()
                .map(from_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(fields) => {
            let mut map = Map::new();
            for (name, value) in fields {
                map.insert(name, from_attribute_value(value)?);
            }
            Value::Object(map)
        }
        other => {
            return Err(Error::Mapping(format!(
                "unsupported attribute value: {:?}",
                other
            )))
        }
    };

    Ok(converted)
}

/// Numeric attribute value
pub fn number(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

/// Reads an integer attribute, `None` when it is absent or `NULL`
pub fn integer_attribute(item: &Item, name: &str) -> Result<Option<i64>> {
    match item.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::N(n)) => n
            .parse::<i64>()
            .map(Some)
            .map_err(|e| Error::Mapping(format!("Invalid {} attribute: {}", name, e))),
        Some(other) => Err(Error::Mapping(format!(
            "Invalid {} attribute: expected a number, got {:?}",
            name, other
        ))),
    }
}

fn parse_number(n: &str) -> Result<Number> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| Error::Mapping(format!("Invalid number: {}", n)))
}

fn bytes_to_json(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
