//! Field projection over fetched results
//!
//! Trims records to a selected field subset while preserving the shape of the
//! result: envelope, array, array-of-arrays and single-record forms all come
//! back in the same form they went in. The cached value is never touched —
//! every caller gets a trimmed copy, so one cache entry can serve callers with
//! different projections.

use serde_json::{Map, Value};

/// Trim `result` down to `fields`. The primary key and the active lookup key
/// are always retained regardless of the selection.
pub fn project(fields: &[String], result: &Value, id_field: &str, lookup_key: &str) -> Value {
    // A dot-addressed lookup key lives under its first path segment.
    let lookup_root = lookup_key.split('.').next().unwrap_or(lookup_key);
    match result {
        Value::Object(map) if map.contains_key("data") => {
            let mut out = map.clone();
            if let Some(Value::Array(rows)) = map.get("data") {
                let trimmed = rows
                    .iter()
                    .map(|row| trim(fields, row, id_field, lookup_root))
                    .collect();
                out.insert("data".to_string(), Value::Array(trimmed));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    // Multi-match results nest one array per requested id.
                    Value::Array(rows) => Value::Array(
                        rows.iter()
                            .map(|row| trim(fields, row, id_field, lookup_root))
                            .collect(),
                    ),
                    other => trim(fields, other, id_field, lookup_root),
                })
                .collect(),
        ),
        other => trim(fields, other, id_field, lookup_root),
    }
}

fn trim(fields: &[String], record: &Value, id_field: &str, lookup_root: &str) -> Value {
    match record {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if key == id_field || key == lookup_root || fields.iter().any(|f| f == key) {
                    out.insert(key.clone(), value.clone());
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trims_a_single_record_keeping_the_primary_key() {
        let record = json!({"id": 1, "body": "x", "userId": 9});
        let result = project(&["body".to_string()], &record, "id", "id");
        assert_eq!(result, json!({"id": 1, "body": "x"}));
    }

    #[test]
    fn retains_the_active_lookup_key() {
        let record = json!({"id": 1, "body": "x", "userId": 9});
        let result = project(&["body".to_string()], &record, "id", "userId");
        assert_eq!(result, json!({"id": 1, "body": "x", "userId": 9}));
    }

    #[test]
    fn preserves_envelope_metadata() {
        let envelope = json!({
            "total": 2,
            "limit": 10,
            "data": [
                {"id": 1, "body": "a", "userId": 9},
                {"id": 2, "body": "b", "userId": 9}
            ]
        });
        let result = project(&["body".to_string()], &envelope, "id", "id");
        assert_eq!(
            result,
            json!({
                "total": 2,
                "limit": 10,
                "data": [{"id": 1, "body": "a"}, {"id": 2, "body": "b"}]
            })
        );
    }

    #[test]
    fn preserves_nested_multi_match_shape() {
        let nested = json!([
            [{"id": 1, "postId": 1, "text": "a"}, {"id": 2, "postId": 1, "text": "b"}],
            null
        ]);
        let result = project(&["text".to_string()], &nested, "id", "postId");
        assert_eq!(
            result,
            json!([
                [{"id": 1, "postId": 1, "text": "a"}, {"id": 2, "postId": 1, "text": "b"}],
                null
            ])
        );
    }

    #[test]
    fn leaves_the_input_untouched() {
        let record = json!({"id": 1, "body": "x", "userId": 9});
        let _ = project(&["body".to_string()], &record, "id", "id");
        assert_eq!(record, json!({"id": 1, "body": "x", "userId": 9}));
    }
}
