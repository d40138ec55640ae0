//! JSON-Cadence codec.
//!
//! Access nodes exchange script arguments, script results and event payloads
//! as JSON-Cadence documents (`{"type": ..., "value": ...}`). Arguments are
//! encoded from [`Argument`]; results are flattened into plain JSON so callers
//! can read fields without knowing Cadence types. Numeric values stay
//! string-encoded, as the ledger sends them.

use crate::error::{FastbreakError, Result};
use crate::types::Argument;
use serde_json::{json, Map, Value};

pub fn encode_argument(arg: &Argument) -> Value {
    match arg {
        Argument::String(s) => json!({ "type": "String", "value": s }),
        Argument::StringArray(items) => json!({
            "type": "Array",
            "value": items
                .iter()
                .map(|s| json!({ "type": "String", "value": s }))
                .collect::<Vec<_>>(),
        }),
        Argument::UInt64(n) => json!({ "type": "UInt64", "value": n.to_string() }),
    }
}

/// Flatten a JSON-Cadence value into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| FastbreakError::decode("JSON-Cadence value must be an object"))?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FastbreakError::decode("JSON-Cadence value missing type"))?;
    let inner = obj.get("value").unwrap_or(&Value::Null);

    match kind {
        "Void" => Ok(Value::Null),
        "Optional" => {
            if inner.is_null() {
                Ok(Value::Null)
            } else {
                decode_value(inner)
            }
        }
        "Bool" | "String" | "Address" | "Character" => Ok(inner.clone()),
        "Int" | "Int8" | "Int16" | "Int32" | "Int64" | "Int128" | "Int256" | "UInt" | "UInt8"
        | "UInt16" | "UInt32" | "UInt64" | "UInt128" | "UInt256" | "Word8" | "Word16"
        | "Word32" | "Word64" | "Fix64" | "UFix64" => Ok(inner.clone()),
        "Array" => {
            let items = inner
                .as_array()
                .ok_or_else(|| FastbreakError::decode("Array value must be a list"))?;
            Ok(Value::Array(
                items.iter().map(decode_value).collect::<Result<Vec<_>>>()?,
            ))
        }
        "Dictionary" => {
            let entries = inner
                .as_array()
                .ok_or_else(|| FastbreakError::decode("Dictionary value must be a list"))?;
            let mut map = Map::new();
            for entry in entries {
                let key = entry
                    .get("key")
                    .ok_or_else(|| FastbreakError::decode("Dictionary entry missing key"))?;
                let value = entry
                    .get("value")
                    .ok_or_else(|| FastbreakError::decode("Dictionary entry missing value"))?;
                map.insert(key_to_string(&decode_value(key)?), decode_value(value)?);
            }
            Ok(Value::Object(map))
        }
        "Struct" | "Resource" | "Event" | "Contract" | "Enum" => {
            let (_, fields) = decode_composite(inner)?;
            Ok(Value::Object(fields))
        }
        "Path" => Ok(json!(format!(
            "/{}/{}",
            inner.get("domain").and_then(Value::as_str).unwrap_or_default(),
            inner
                .get("identifier")
                .and_then(Value::as_str)
                .unwrap_or_default()
        ))),
        other => Err(FastbreakError::decode(format!(
            "Unsupported JSON-Cadence type: {}",
            other
        ))),
    }
}

/// Decode a composite body into its type id and flattened fields.
pub fn decode_composite(inner: &Value) -> Result<(String, Map<String, Value>)> {
    let id = inner
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| FastbreakError::decode("Composite value missing id"))?
        .to_string();
    let fields = inner
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| FastbreakError::decode("Composite value missing fields"))?;

    let mut map = Map::new();
    for field in fields {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| FastbreakError::decode("Composite field missing name"))?;
        let value = field
            .get("value")
            .ok_or_else(|| FastbreakError::decode("Composite field missing value"))?;
        map.insert(name.to_string(), decode_value(value)?);
    }

    Ok((id, map))
}

/// Decode an event payload into its event type and flattened fields.
pub fn decode_event(payload: &Value) -> Result<(String, Map<String, Value>)> {
    match payload.get("type").and_then(Value::as_str) {
        Some("Event") => decode_composite(payload.get("value").unwrap_or(&Value::Null)),
        _ => Err(FastbreakError::decode("Event payload is not a JSON-Cadence event")),
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a string-encoded or numeric integer.
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
