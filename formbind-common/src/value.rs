//! Value helpers shared by the write and read paths

use serde_json::Value;

/// Check whether a submitted answer carries meaningful content
///
/// Empty or whitespace-only strings, null, empty arrays, empty objects and
/// non-finite numbers are treated as "not answered". Booleans always count,
/// including `false`.
pub fn has_meaningful_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) => true,
        Value::Number(n) => n.as_f64().map(f64::is_finite).unwrap_or(true),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value as plain text for display or text-column storage
///
/// Strings are returned without surrounding quotes; everything else uses its
/// JSON form.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
