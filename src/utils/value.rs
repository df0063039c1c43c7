/*!
 * Predicates over `serde_json::Value`.
 *
 * Raw request input and computed properties are both plain JSON values, so
 * the notions of "blank", "truthy" and "scalar" used by chains, `clean` and
 * `permit` are defined once here.
 */

use serde_json::Value;

/// Whether a value counts as missing for required-field checks.
///
/// Null, empty or whitespace-only strings, and empty arrays or objects are
/// blank. Numbers and booleans (including `false`) never are.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Truthiness used by filtering operations: only null and `false` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Scalars are everything except arrays and objects.
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Short type label for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
