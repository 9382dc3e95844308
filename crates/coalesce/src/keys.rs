//! Canonical cache-key derivation
//!
//! Cache keys are the stable string form of a normalized request plus the
//! owning collection's name. Object keys are sorted at every nesting level so
//! insertion order never affects the key; array order is preserved, because
//! arrays are semantically ordered (multi-id arrays are sorted before they get
//! here, see [`crate::request::canonical_ids`]).

use crate::error::{LoaderError, LoaderResult};
use crate::request::RequestKind;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Convert a caller-supplied value into the JSON space the engine works in.
/// Anything that cannot be represented (non-finite floats, non-string map
/// keys) is a serialization error, never silently skipped.
pub fn to_value<T: Serialize>(value: T) -> LoaderResult<Value> {
    serde_json::to_value(value).map_err(|err| LoaderError::Serialization(err.to_string()))
}

/// Serialize a value with object keys sorted at every level.
pub fn stable_stringify(value: &Value) -> LoaderResult<String> {
    serde_json::to_string(&canonicalize(value))
        .map_err(|err| LoaderError::Serialization(err.to_string()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key.clone(), canonicalize(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical key for one cached result. The `service` field tags the entry
/// with its owning collection so a shared store can be swept per loader.
pub(crate) fn cache_key(
    service: &str,
    id: &Value,
    key: &str,
    multi: bool,
    kind: RequestKind,
    cache_params: &Option<Value>,
) -> LoaderResult<String> {
    stable_stringify(&json!({
        "service": service,
        "id": id,
        "key": key,
        "multi": multi,
        "method": kind.as_str(),
        "params": cache_params,
    }))
}

/// Canonical key for a batch group: the request shape without the id.
pub(crate) fn shape_key(
    key: &str,
    multi: bool,
    kind: RequestKind,
    cache_params: &Option<Value>,
) -> LoaderResult<String> {
    stable_stringify(&json!({
        "key": key,
        "multi": multi,
        "method": kind.as_str(),
        "params": cache_params,
    }))
}

/// The collection tag of a cache key, if the key parses as one of ours.
pub(crate) fn service_tag(raw_key: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(raw_key).ok()?;
    parsed.get("service")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_order_does_not_affect_the_output() {
        let mut forward = Map::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!({"y": 2, "x": 1}));

        let mut reverse = Map::new();
        reverse.insert("b".to_string(), json!({"x": 1, "y": 2}));
        reverse.insert("a".to_string(), json!(1));

        assert_eq!(
            stable_stringify(&Value::Object(forward)).unwrap(),
            stable_stringify(&Value::Object(reverse)).unwrap()
        );
    }

    #[test]
    fn nested_objects_are_sorted_at_every_level() {
        let value = json!({"outer": {"b": {"d": 1, "c": 2}, "a": 3}});
        assert_eq!(
            stable_stringify(&value).unwrap(),
            r#"{"outer":{"a":3,"b":{"c":2,"d":1}}}"#
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!({"ids": [3, 1, 2]});
        assert_eq!(stable_stringify(&value).unwrap(), r#"{"ids":[3,1,2]}"#);
    }

    #[test]
    fn non_serializable_values_are_rejected() {
        let err = to_value(f64::NAN).unwrap_err();
        assert!(matches!(err, LoaderError::Serialization(_)));
    }

    #[test]
    fn cache_keys_carry_the_service_tag() {
        let key = cache_key("posts", &json!(1), "id", false, RequestKind::Load, &None).unwrap();
        assert_eq!(service_tag(&key).as_deref(), Some("posts"));
        assert_eq!(service_tag("not json"), None);
    }

    #[test]
    fn shape_key_ignores_the_id() {
        let a = shape_key("id", false, RequestKind::Load, &None).unwrap();
        let b = shape_key("id", false, RequestKind::Load, &None).unwrap();
        assert_eq!(a, b);
        let c = shape_key("id", true, RequestKind::Load, &None).unwrap();
        assert_ne!(a, c);
    }
}
