//! End-to-end directive runs against the in-memory storage backend.

mod common;

use common::builders::{denormalizing_order_schema, order_input, order_schema, order_schema_builder};
use legatus_core::directive::{Directive, DirectiveState, ExecutionError, Phase, Stage};
use legatus_core::registry::{DirectiveRegistry, RunOutcome};
use legatus_core::storage::{InMemoryStorage, PersistAction};
use legatus_core::unit_of_work::PersistenceError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_order_directive_persists_everything() {
    common::init_test_logging();
    let storage = InMemoryStorage::new();
    let mut directive = Directive::new(order_schema(), order_input()).unwrap();

    assert_eq!(directive.prop("code"), Some(&json!("A-1")));
    assert_eq!(directive.prop("note"), Some(&json!(null)));

    directive.execute(&storage).unwrap();

    assert_eq!(directive.state(), DirectiveState::Persisted);
    assert!(directive.errors().is_empty());
    assert_eq!(storage.row_count("orders"), 1);
    assert_eq!(storage.row_count("line_items"), 2);
    assert_eq!(storage.stats().committed, 1);
    assert_eq!(storage.stats().rolled_back, 0);
}

#[test]
fn test_blank_required_property_stops_at_load() {
    let storage = InMemoryStorage::new();
    let after_clean = Arc::new(AtomicUsize::new(0));
    let before_load = Arc::new(AtomicUsize::new(0));
    let cleaned = Arc::clone(&after_clean);
    let loading = Arc::clone(&before_load);
    let schema = order_schema_builder()
        .callback(Stage::Clean, Phase::After, move |_| {
            cleaned.fetch_add(1, Ordering::SeqCst);
            true
        })
        .callback(Stage::Load, Phase::Before, move |_| {
            loading.fetch_add(1, Ordering::SeqCst);
            true
        })
        .build()
        .unwrap();

    let mut directive = Directive::new(schema, json!({"code": "   "})).unwrap();
    let err = directive.execute(&storage).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    assert_eq!(directive.state(), DirectiveState::Aborted);
    assert_eq!(directive.errors().to_value(), json!({"code": {"base": ["is required"]}}));
    assert_eq!(after_clean.load(Ordering::SeqCst), 1);
    assert_eq!(before_load.load(Ordering::SeqCst), 1);
    assert!(directive.model("order").map_or(true, |m| m.is_none()));
    assert!(storage.attempted_writes().is_empty());
}

#[test]
fn test_invalid_line_item_reported_by_index() {
    let storage = InMemoryStorage::new();
    let input = json!({
        "code": "A-1",
        "line_items": [
            {"sku": "X", "quantity": 1},
            {"sku": "", "quantity": 3},
            {"sku": "Z", "quantity": null},
        ],
    });
    let mut directive = Directive::new(order_schema(), input).unwrap();
    let err = directive.execute(&storage).unwrap_err();

    assert!(matches!(err, ExecutionError::Invalid { stage: Stage::Validate, .. }));
    assert_eq!(
        directive.errors().to_value(),
        json!({
            "line_items": {
                "1": {"sku": {"base": ["is required"]}},
                "2": {"quantity": {"base": ["is required"]}},
            }
        })
    );
    assert_eq!(storage.stats().begun, 0);
}

#[test]
fn test_storage_rejection_rolls_back_every_write() {
    let storage = InMemoryStorage::new();
    storage.reject("line_items", PersistAction::Save);

    let mut directive = Directive::new(order_schema(), order_input()).unwrap();
    let err = directive.execute(&storage).unwrap_err();

    assert!(err.is_persistence_failure());
    assert!(matches!(
        err,
        ExecutionError::Persistence(PersistenceError::OperationFailed { position: 2, .. })
    ));
    assert_eq!(storage.row_count("orders"), 0);
    assert_eq!(storage.row_count("line_items"), 0);
    assert_eq!(storage.stats().rolled_back, 1);
    assert!(storage.committed_writes().is_empty());
}

#[test]
fn test_denormalized_totals_saved_with_order() {
    let storage = InMemoryStorage::new();
    let mut directive = Directive::new(denormalizing_order_schema(), order_input()).unwrap();
    directive.execute(&storage).unwrap();

    let rows = storage.rows("orders");
    assert_eq!(rows.len(), 1);
    let (_, row) = &rows[0];
    assert_eq!(row["total_quantity"], json!(42));
    assert_eq!(row["largest_quantity"], json!(40));
}

#[test]
fn test_after_persist_gate_sees_committed_state() {
    let storage = Arc::new(InMemoryStorage::new());
    let observed = Arc::clone(&storage);
    let schema = order_schema_builder()
        .callback(Stage::Persist, Phase::After, move |d| {
            d.state() == DirectiveState::Persisted && observed.row_count("orders") == 1
        })
        .build()
        .unwrap();

    let mut directive = Directive::new(schema, order_input()).unwrap();
    directive.execute(storage.as_ref()).unwrap();
}

#[test]
fn test_registry_run_folds_failures_into_outcome() {
    let registry = DirectiveRegistry::new();
    registry.register("orders#create", order_schema()).unwrap();
    let storage = InMemoryStorage::new();

    let completed = registry.run("orders#create", order_input(), &storage).unwrap();
    assert!(completed.is_completed());
    assert_eq!(completed.to_value()["properties"]["code"], json!("A-1"));

    let rejected = registry.run("orders#create", json!({}), &storage).unwrap();
    match rejected {
        RunOutcome::Rejected { errors, stage, .. } => {
            assert_eq!(stage, Some(Stage::Load));
            assert!(errors.contains_key("code"));
        }
        RunOutcome::Completed { .. } => panic!("blank code must be rejected"),
    }

    assert!(registry.run("orders#destroy", json!({}), &storage).is_err());
}
