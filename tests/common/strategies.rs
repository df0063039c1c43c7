//! Proptest strategies for JSON inputs and error messages.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Field names used as chain keys
pub fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Scalar JSON values, null included
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ a-zA-Z0-9]{0,16}".prop_map(Value::from),
    ]
}

/// Nested JSON values of bounded depth
pub fn json_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0..4)
                .prop_map(|map| json!(map)),
        ]
    })
}

/// `(key, message)` pairs to feed into error trees
pub fn error_entries_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((key_strategy(), "[a-z ]{1,20}"), 0..8)
}

/// JSON objects whose members are arbitrary nested values
pub fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(key_strategy(), json_strategy(), 0..6).prop_map(|map| json!(map))
}
