//! Oversized-response truncation: string payloads are capped and flagged
//! rather than the whole response being dropped or omitted.

use serde_json::Value;

/// Contractual maximum serialized response size.
pub const MAX_RESPONSE_BYTES: usize = 100 * 1024;

/// Per-string-field cap applied once a response crosses [`MAX_RESPONSE_BYTES`].
const PER_FIELD_CAP: usize = 2000;

const SUFFIX: &str = " [TRUNCATED - response too large]";

/// Returns `value` unchanged if its serialized form fits the budget;
/// otherwise returns a structurally identical value with long strings
/// capped and a `_truncated: true` marker attached.
pub fn truncate_if_oversized(value: Value) -> Value {
    let serialized_len = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
    if serialized_len <= MAX_RESPONSE_BYTES {
        return value;
    }
    let mut truncated = cap_strings(value);
    mark_truncated(&mut truncated);
    truncated
}

fn cap_strings(value: Value) -> Value {
    match value {
        Value::String(s) if s.len() > PER_FIELD_CAP => {
            let mut capped: String = s.chars().take(PER_FIELD_CAP).collect();
            capped.push_str(SUFFIX);
            Value::String(capped)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(cap_strings).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, cap_strings(v))).collect()),
        other => other,
    }
}

fn mark_truncated(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.insert("_truncated".to_string(), Value::Bool(true));
        }
        Value::Array(items) => {
            items.push(serde_json::json!({"_truncated": true}));
        }
        other => {
            *other = serde_json::json!({"value": other.clone(), "_truncated": true});
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_results_pass_through_unchanged() {
        let value = serde_json::json!({"ok": true});
        assert_eq!(truncate_if_oversized(value.clone()), value);
    }

    #[test]
    fn oversized_object_gets_truncated_marker_and_capped_strings() {
        let big = "x".repeat(MAX_RESPONSE_BYTES + 1000);
        let value = serde_json::json!({"text": big});
        let result = truncate_if_oversized(value);
        assert_eq!(result["_truncated"], true);
        assert!(result["text"].as_str().unwrap().len() < MAX_RESPONSE_BYTES);
        assert!(result["text"].as_str().unwrap().ends_with(SUFFIX));
    }

    #[test]
    fn nested_strings_are_capped_too() {
        let big = "y".repeat(MAX_RESPONSE_BYTES + 1000);
        let value = serde_json::json!({"outer": {"inner": big}});
        let result = truncate_if_oversized(value);
        assert!(result["outer"]["inner"].as_str().unwrap().ends_with(SUFFIX));
    }
}
