//! Demultiplexing bulk results back to the requested keys

use serde_json::Value;
use std::collections::HashMap;

/// Walk a dot-addressed path (`"author.id"`) into a record.
pub fn get_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// String identity of a scalar, matching across a numeric id and its string
/// form the way the original wire format does.
pub(crate) fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows of a find result, whether it arrived as a bare array or wrapped in a
/// `{"data": [...]}` envelope.
pub fn envelope_rows(result: &Value) -> Vec<Value> {
    match result {
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        Value::Array(rows) => rows.clone(),
        _ => Vec::new(),
    }
}

/// Drop duplicate keys while preserving first-seen order.
pub fn unique_keys(keys: &[Value]) -> Vec<Value> {
    let mut seen = HashMap::new();
    let mut unique = Vec::new();
    for key in keys {
        let id = value_key(key);
        seen.entry(id).or_insert_with(|| unique.push(key.clone()));
    }
    unique
}

/// Single-match demux: for each key, the first row whose `key` field equals
/// it, or null.
pub fn unique_results(keys: &[Value], rows: &[Value], key: &str) -> Vec<Value> {
    let mut found: HashMap<String, &Value> = HashMap::new();
    for row in rows {
        if let Some(value) = get_path(row, key) {
            found.entry(value_key(value)).or_insert(row);
        }
    }
    keys.iter()
        .map(|key| found.get(&value_key(key)).map(|&row| row.clone()).unwrap_or(Value::Null))
        .collect()
}

/// Multi-match demux: for each key, the ordered array of all rows whose `key`
/// field equals it, or null when none matched.
pub fn unique_results_multi(keys: &[Value], rows: &[Value], key: &str) -> Vec<Value> {
    let mut found: HashMap<String, Vec<Value>> = HashMap::new();
    for row in rows {
        if let Some(value) = get_path(row, key) {
            found.entry(value_key(value)).or_default().push(row.clone());
        }
    }
    keys.iter()
        .map(|key| match found.get(&value_key(key)) {
            Some(rows) => Value::Array(rows.clone()),
            None => Value::Null,
        })
        .collect()
}
