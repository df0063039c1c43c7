//! Schema and record builders for an order-entry directive.

use legatus_core::chain::Chain;
use legatus_core::directive::{DirectiveSchema, DirectiveSchemaBuilder, Hook};
use legatus_core::storage::{AttributeRecord, Loaded, RecordRef};
use legatus_core::unit_of_work::{Aggregate, Denormalization};
use serde_json::{json, Value};
use std::sync::Arc;

/// `fetch(key)` chain
pub fn fetch(key: &str) -> Chain {
    Chain::builder()
        .step("fetch", [json!(key)])
        .build()
        .expect("fetch chain builds")
}

/// `fetch(key) | strip | presence`
pub fn text(key: &str) -> Chain {
    Chain::builder()
        .step("fetch", [json!(key)])
        .then("strip")
        .then("presence")
        .build()
        .expect("text chain builds")
}

pub fn line_item(sku: &str, quantity: Value) -> AttributeRecord {
    AttributeRecord::new("line_items")
        .with_attribute("sku", json!(sku))
        .with_attribute("quantity", quantity)
        .with_required(["sku", "quantity"])
}

/// Order directive: a customer code, an order loaded from props, and its
/// line items loaded from the raw input
pub fn order_schema_builder() -> DirectiveSchemaBuilder {
    DirectiveSchema::builder("create_order")
        .property("code", text("code"))
        .optional_property("note", text("note"))
        .model(
            "order",
            Hook::loader(|d| {
                let code = d.prop("code").cloned().unwrap_or(Value::Null);
                let record = AttributeRecord::new("orders")
                    .with_attribute("code", code)
                    .with_required(["code"]);
                Ok(RecordRef::new(record).into())
            }),
        )
        .model(
            "line_items",
            Hook::loader(|d| {
                let items = d.raw_input()["line_items"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                let records: Vec<RecordRef> = items
                    .iter()
                    .map(|item| {
                        RecordRef::new(line_item(
                            item["sku"].as_str().unwrap_or_default(),
                            item["quantity"].clone(),
                        ))
                    })
                    .collect();
                Ok(Loaded::Many(records))
            }),
        )
        .validate(["order", "line_items"])
        .transaction(|uow, d| {
            uow.save(d.model("order"));
            uow.save(d.model("line_items"));
            Ok(())
        })
}

pub fn order_schema() -> Arc<DirectiveSchema> {
    order_schema_builder().build().expect("order schema builds")
}

/// Order directive that also rolls line item quantities onto the order
pub fn denormalizing_order_schema() -> Arc<DirectiveSchema> {
    DirectiveSchema::builder("create_order_with_totals")
        .property("code", text("code"))
        .model(
            "order",
            Hook::loader(|d| {
                let code = d.prop("code").cloned().unwrap_or(Value::Null);
                let items = d.raw_input()["line_items"].as_array().cloned().unwrap_or_default();
                let record = AttributeRecord::new("orders")
                    .with_attribute("code", code)
                    .with_association("line_items", items);
                Ok(RecordRef::new(record).into())
            }),
        )
        .transaction(|uow, d| {
            if let Some(order) = d.model("order").and_then(Loaded::as_one) {
                let rules = Denormalization::new()
                    .rule("total_quantity", "line_items", Aggregate::Sum, "quantity")
                    .rule("largest_quantity", "line_items", Aggregate::Maximum, "quantity");
                uow.denormalize(order.clone(), rules).save([order]);
            }
            Ok(())
        })
        .build()
        .expect("denormalizing schema builds")
}

pub fn order_input() -> Value {
    json!({
        "code": "  A-1 ",
        "note": "",
        "line_items": [
            {"sku": "X", "quantity": 2},
            {"sku": "Y", "quantity": 40},
        ],
    })
}
