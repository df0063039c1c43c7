mod common;

use common::strategies::*;
use legatus_core::chain::{Chain, OperationRegistry};
use legatus_core::directive::{permit, ErrorTree, PermitSchema};
use legatus_core::utils::is_scalar;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

proptest! {
    /// Property: once a step yields null, no later step runs
    #[test]
    fn null_short_circuits_later_steps(input in object_strategy(), key in key_strategy()) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = OperationRegistry::with_builtins();
        registry.register("count", move |value, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        });

        let chain = Chain::builder_with(&registry)
            .step("fetch", [json!(key.clone())])
            .then("count")
            .build()
            .unwrap();

        let fetched = input.get(key.as_str()).cloned().unwrap_or(Value::Null);
        let result = chain.apply(&input).unwrap();

        prop_assert_eq!(&result, &fetched);
        let expected_calls = usize::from(!fetched.is_null());
        prop_assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }

    /// Property: a null source is returned untouched by any chain
    #[test]
    fn null_source_yields_null(key in key_strategy()) {
        let chain = Chain::builder()
            .step("fetch", [json!(key)])
            .then("strip")
            .then("upcase")
            .build()
            .unwrap();
        prop_assert_eq!(chain.apply(&Value::Null).unwrap(), Value::Null);
    }

    /// Property: merging never loses messages
    #[test]
    fn merge_is_monotonic(left in error_entries_strategy(), right in error_entries_strategy()) {
        let mut a = ErrorTree::new();
        for (key, message) in &left {
            a.add(key.as_str(), message.as_str());
        }
        let mut b = ErrorTree::new();
        for (key, message) in &right {
            b.add(key.as_str(), message.as_str());
        }

        let before = a.message_count();
        let incoming = b.message_count();
        a.merge(b);

        prop_assert_eq!(a.message_count(), before + incoming);
        for (key, _) in left.iter().chain(right.iter()) {
            prop_assert!(a.contains_key(key.as_str()));
        }
    }

    /// Property: permit output only holds whitelisted keys and scalar leaves
    #[test]
    fn permit_never_leaks_unlisted_keys(input in json_strategy(), fields in prop::collection::vec(key_strategy(), 0..4)) {
        let schema = fields.iter().fold(PermitSchema::new(), |schema, f| schema.field(f.as_str()));
        let permitted = permit(&input, &schema);

        let map = permitted.as_object().unwrap();
        for (key, value) in map {
            prop_assert!(fields.contains(key));
            let scalar_leaves = match value {
                Value::Array(items) => items.iter().all(is_scalar),
                other => is_scalar(other),
            };
            prop_assert!(scalar_leaves);
        }
    }
}
