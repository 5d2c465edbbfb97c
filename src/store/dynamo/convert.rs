//! Conversion between items and DynamoDB attribute maps.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use serde_json::{Number, Value};

use crate::error::BackendError;
use crate::item::{self, Item};

type Result<T> = std::result::Result<T, BackendError>;

/// Attribute map for a request.
pub fn to_attribute_map(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(field, value)| (field.clone(), to_attribute_value(value)))
        .collect()
}

/// Attribute map, or `None` when empty (DynamoDB rejects empty maps).
pub fn to_optional_attribute_map(item: &Item) -> Option<HashMap<String, AttributeValue>> {
    (!item.is_empty()).then(|| to_attribute_map(item))
}

pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute_value).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Item from a DynamoDB attribute map.
///
/// Key fields come first, remaining fields in name order, so results are
/// stable regardless of the SDK's hash map ordering.
pub fn from_attribute_map(attributes: &HashMap<String, AttributeValue>) -> Result<Item> {
    let mut fields: Vec<&String> = attributes.keys().collect();
    fields.sort_by(|a, b| {
        (!item::is_key_field(a), a.as_str()).cmp(&(!item::is_key_field(b), b.as_str()))
    });

    let mut item = Item::new();
    for field in fields {
        item.insert(field.clone(), from_attribute_value(&attributes[field])?);
    }
    Ok(item)
}

pub fn from_attribute_value(value: &AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(parse_number(n)?),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(blob) => Value::String(encode_blob(blob)),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)?),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .iter()
                .map(|b| Value::String(encode_blob(b)))
                .collect(),
        ),
        other => {
            return Err(BackendError::invalid_item(format!(
                "unsupported attribute value: {:?}",
                other
            )))
        }
    })
}

fn parse_number(raw: &str) -> Result<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Number::from(u));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| BackendError::invalid_item(format!("invalid number attribute: {}", raw)))
}

fn encode_blob(blob: &Blob) -> String {
    base64::engine::general_purpose::STANDARD.encode(blob.as_ref())
}
