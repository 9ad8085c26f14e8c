// src/model/wire.rs

//! Lenient field extraction from service payloads.
//!
//! The service is not strict about scalar types (epochs arrive as numbers or
//! strings, flags as booleans or `0`/`1`), so every accessor here accepts the
//! reasonable spellings and returns `None` for anything else.

use serde_json::{Map, Value};

pub(crate) fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn unsigned(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn integer(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn boolean(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    flag(obj.get(key)?)
}

/// A boolean sent as `true`, `1` or `"yes"`
pub(crate) fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

/// A list of strings; a bare string is treated as a one-element list
pub(crate) fn string_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    match obj.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
        ),
        Value::String(s) if !s.is_empty() => Some(vec![s.clone()]),
        _ => None,
    }
}

/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Insert `value` under `key` only when present
pub(crate) fn put<T: Into<Value>>(obj: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        obj.insert(key.to_string(), v.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_scalars_accept_either_spelling() {
        let o = obj(json!({"e": "2", "c": 10, "gc": "true", "en": 0, "s": ""}));
        assert_eq!(unsigned(&o, "e"), Some(2));
        assert_eq!(integer(&o, "c"), Some(10));
        assert_eq!(boolean(&o, "gc"), Some(true));
        assert_eq!(boolean(&o, "en"), Some(false));
        assert_eq!(string(&o, "s"), None);
        assert_eq!(string(&o, "missing"), None);
    }

    #[test]
    fn test_string_list_from_bare_string() {
        let o = obj(json!({"bu": "http://a", "gk": ["k1", 3, "k2"]}));
        assert_eq!(string_list(&o, "bu"), Some(vec!["http://a".to_string()]));
        assert_eq!(
            string_list(&o, "gk"),
            Some(vec!["k1".to_string(), "k2".to_string()])
        );
    }
}
