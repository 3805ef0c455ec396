//! Type conversions between JSON values and DynamoDB AttributeValue.
//!
//! DynamoDB numbers are decimal strings with no float type, so JSON numbers
//! are carried over by their exact text (`to_decimal`) and turned back into
//! native JSON integers or floats on the way out (`to_number`).

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::errors::{EncryptionError, Result};

/// One DynamoDB record.
pub type Item = HashMap<String, AttributeValue>;

/// Largest integer an f64 represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert a JSON object to DynamoDB attribute values.
///
/// Numbers keep their exact textual form, so `10.5` is stored as `N("10.5")`.
pub fn to_decimal(data: &Map<String, Value>) -> Result<Item> {
    data.iter()
        .map(|(k, v)| Ok((k.clone(), json_to_attribute_value(v)?)))
        .collect()
}

/// Convert a single JSON value to a DynamoDB AttributeValue.
pub fn json_to_attribute_value(value: &Value) -> Result<AttributeValue> {
    Ok(match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(
            items
                .iter()
                .map(json_to_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => AttributeValue::M(to_decimal(map)?),
    })
}

/// Convert DynamoDB attribute values back to a JSON object.
///
/// Integral decimals become integers, others floats. Binary values render
/// as base64 strings.
pub fn to_number(item: Item) -> Result<Map<String, Value>> {
    let mut result = Map::new();
    for (key, value) in item {
        result.insert(key, attribute_value_to_json(value)?);
    }
    Ok(result)
}

/// Convert a single DynamoDB AttributeValue to a native JSON value.
pub fn attribute_value_to_json(value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::String(s)),
        AttributeValue::N(n) => decimal_to_json_number(&n),
        AttributeValue::Bool(b) => Ok(Value::Bool(b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::B(b) => Ok(Value::String(BASE64.encode(b.as_ref()))),
        AttributeValue::L(list) => Ok(Value::Array(
            list.into_iter()
                .map(attribute_value_to_json)
                .collect::<Result<Vec<_>>>()?,
        )),
        AttributeValue::M(map) => Ok(Value::Object(to_number(map)?)),
        AttributeValue::Ss(ss) => Ok(Value::Array(ss.into_iter().map(Value::String).collect())),
        AttributeValue::Ns(ns) => Ok(Value::Array(
            ns.iter()
                .map(String::as_str)
                .map(decimal_to_json_number)
                .collect::<Result<Vec<_>>>()?,
        )),
        AttributeValue::Bs(bs) => Ok(Value::Array(
            bs.iter()
                .map(|b| Value::String(BASE64.encode(b.as_ref())))
                .collect(),
        )),
        _ => Err(EncryptionError::Serialization(
            "Unknown DynamoDB AttributeValue type".to_string(),
        )),
    }
}

/// Parse a DynamoDB decimal string into a JSON number.
///
/// Whole values (`10`, `10.00`, `1.25e2`) that fit i64/u64 come back as
/// exact integers; larger ones come back as floats.
pub fn decimal_to_json_number(n: &str) -> Result<Value> {
    let n = n.trim();
    if let Some(digits) = integral_text(n) {
        if let Ok(i) = digits.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        if let Ok(u) = digits.parse::<u64>() {
            return Ok(Value::Number(u.into()));
        }
    }

    let f: f64 = n
        .parse()
        .map_err(|_| EncryptionError::InvalidNumber(n.to_string()))?;
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        return Ok(Value::Number((f as i64).into()));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EncryptionError::InvalidNumber(n.to_string()))
}

/// Integer text of a whole decimal, e.g. `"12.50e1"` -> `"125"`.
///
/// `None` when the value has a non-zero fraction or a negative exponent.
fn integral_text(n: &str) -> Option<String> {
    let (mantissa, exponent) = match n.find(['e', 'E']) {
        Some(at) => (&n[..at], n[at + 1..].parse::<i32>().ok()?),
        None => (n, 0),
    };
    // u64 has 20 digits; anything past that goes through f64 anyway.
    if !(0..=40).contains(&exponent) {
        return None;
    }
    let (sign, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let exponent = exponent as usize;
    let shift = exponent.min(fraction.len());
    let (moved, rest) = fraction.split_at(shift);
    if !rest.bytes().all(|b| b == b'0') {
        return None;
    }
    Some(format!(
        "{}{}{}{}",
        sign,
        whole,
        moved,
        "0".repeat(exponent - shift)
    ))
}

/// Encode an AttributeValue in DynamoDB JSON (`{"S": "..."}`, `{"N": "..."}`, ...).
///
/// Unlike [`attribute_value_to_json`] this keeps the type tag, so sets and
/// binary survive a round trip.
pub fn to_tagged_json(value: &AttributeValue) -> Result<Value> {
    let (tag, inner) = match value {
        AttributeValue::S(s) => ("S", Value::String(s.clone())),
        AttributeValue::N(n) => ("N", Value::String(n.clone())),
        AttributeValue::B(b) => ("B", Value::String(BASE64.encode(b.as_ref()))),
        AttributeValue::Bool(b) => ("BOOL", Value::Bool(*b)),
        AttributeValue::Null(b) => ("NULL", Value::Bool(*b)),
        AttributeValue::L(list) => (
            "L",
            Value::Array(list.iter().map(to_tagged_json).collect::<Result<Vec<_>>>()?),
        ),
        AttributeValue::M(map) => {
            let mut object = Map::new();
            for (k, v) in map {
                object.insert(k.clone(), to_tagged_json(v)?);
            }
            ("M", Value::Object(object))
        }
        AttributeValue::Ss(ss) => ("SS", Value::Array(ss.iter().cloned().map(Value::String).collect())),
        AttributeValue::Ns(ns) => ("NS", Value::Array(ns.iter().cloned().map(Value::String).collect())),
        AttributeValue::Bs(bs) => (
            "BS",
            Value::Array(
                bs.iter()
                    .map(|b| Value::String(BASE64.encode(b.as_ref())))
                    .collect(),
            ),
        ),
        _ => {
            return Err(EncryptionError::Serialization(
                "Unknown DynamoDB AttributeValue type".to_string(),
            ));
        }
    };
    let mut tagged = Map::new();
    tagged.insert(tag.to_string(), inner);
    Ok(Value::Object(tagged))
}

/// Decode a value produced by [`to_tagged_json`].
pub fn from_tagged_json(value: &Value) -> Result<AttributeValue> {
    let invalid = || EncryptionError::Serialization(format!("Invalid DynamoDB JSON: {}", value));

    let object = value.as_object().filter(|o| o.len() == 1).ok_or_else(invalid)?;
    let (tag, inner) = object.iter().next().ok_or_else(invalid)?;

    let string = |v: &Value| v.as_str().map(str::to_string).ok_or_else(invalid);
    let strings = |v: &Value| -> Result<Vec<String>> {
        v.as_array()
            .ok_or_else(invalid)?
            .iter()
            .map(string)
            .collect()
    };
    let blob = |v: &Value| -> Result<Blob> {
        let encoded = v.as_str().ok_or_else(invalid)?;
        Ok(Blob::new(BASE64.decode(encoded)?))
    };

    match tag.as_str() {
        "S" => Ok(AttributeValue::S(string(inner)?)),
        "N" => Ok(AttributeValue::N(string(inner)?)),
        "B" => Ok(AttributeValue::B(blob(inner)?)),
        "BOOL" => Ok(AttributeValue::Bool(inner.as_bool().ok_or_else(invalid)?)),
        "NULL" => Ok(AttributeValue::Null(inner.as_bool().ok_or_else(invalid)?)),
        "L" => Ok(AttributeValue::L(
            inner
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(from_tagged_json)
                .collect::<Result<Vec<_>>>()?,
        )),
        "M" => {
            let mut map = HashMap::new();
            for (k, v) in inner.as_object().ok_or_else(invalid)? {
                map.insert(k.clone(), from_tagged_json(v)?);
            }
            Ok(AttributeValue::M(map))
        }
        "SS" => Ok(AttributeValue::Ss(strings(inner)?)),
        "NS" => Ok(AttributeValue::Ns(strings(inner)?)),
        "BS" => Ok(AttributeValue::Bs(
            inner
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(blob)
                .collect::<Result<Vec<_>>>()?,
        )),
        _ => Err(invalid()),
    }
}
