/*
 * from_json.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JSON interop for template values.
//!
//! Hosts frequently hold their render parameters as JSON; these
//! conversions map between `serde_json::Value` and the engine's
//! [`Value`] in both directions. Host-backed lazy containers are
//! materialized on the way out; callables have no JSON form and map to
//! null.

use std::sync::Arc;

use crate::value::{Value, ValueMap};

/// Convert a parsed JSON value into a template value.
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            Value::from(items.iter().map(value_from_json).collect::<Vec<_>>())
        }
        serde_json::Value::Object(entries) => {
            let mut map = ValueMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), value_from_json(value));
            }
            Value::from(map)
        }
    }
}

/// Convert a template value into JSON.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Empty => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s, _) => serde_json::Value::String(s.to_string()),
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Map(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map.iter() {
                out.insert(key.clone(), value_to_json(value));
            }
            serde_json::Value::Object(out)
        }
        Value::DynList(list) => {
            let items = list.materialize();
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::DynMap(map) => {
            let mut out = serde_json::Map::new();
            for key in map.keys() {
                let value = map.get(&key).unwrap_or_default();
                out.insert(key, value_to_json(&value));
            }
            serde_json::Value::Object(out)
        }
        Value::Callable(_) => serde_json::Value::Null,
    }
}

/// Parse a JSON document into a template value.
pub fn from_json_str(source: &str) -> Result<Value, serde_json::Error> {
    Ok(value_from_json(&serde_json::from_str(source)?))
}

/// Serialize a template value as a JSON document.
pub fn to_json_string(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&value_to_json(value))
}

/// Parse a JSON object into a parameter map for rendering.
pub fn params_from_json(source: &str) -> Result<ValueMap, serde_json::Error> {
    let value = from_json_str(source)?;
    match value {
        Value::Map(map) => Ok(Arc::try_unwrap(map).unwrap_or_else(|arc| arc.as_ref().clone())),
        other => {
            let mut map = ValueMap::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}
