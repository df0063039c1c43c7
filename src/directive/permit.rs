//! Whitelist filtering of raw nested input.
//!
//! A [`PermitSchema`] names the top-level fields that may pass through and,
//! for nested associations, the schema their members are filtered with.
//! Nested results are stored under the association name plus a suffix
//! (`line_items` becomes `line_items_attributes`) so the output can be handed
//! straight to an associated record's attribute assignment.

use crate::constants::messages::NESTED_ATTRIBUTES_SUFFIX;
use crate::constants::system::MAX_PERMIT_DEPTH;
use crate::utils::is_scalar;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Allowed shape of a nested input structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermitSchema {
    fields: Vec<String>,
    nested: BTreeMap<String, PermitSchema>,
}

impl PermitSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a scalar (or array-of-scalars) field
    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    /// Allow a nested association filtered by `schema`
    pub fn nested(mut self, name: impl Into<String>, schema: PermitSchema) -> Self {
        self.nested.insert(name.into(), schema);
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn nested_schemas(&self) -> &BTreeMap<String, PermitSchema> {
        &self.nested
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nested.is_empty()
    }

    /// Parse a list of entries such as
    /// `["name", {"line_items": ["product_id", "quantity"]}]`.
    pub fn from_values(entries: &[Value]) -> Result<Self, String> {
        Self::parse_entries(entries, 0)
    }

    /// Parse a single JSON value: a field name, a list of entries, or an
    /// object of nested associations
    pub fn from_value(value: &Value) -> Result<Self, String> {
        Self::parse_entries(std::slice::from_ref(value), 0)
    }

    fn parse_entries(entries: &[Value], depth: usize) -> Result<Self, String> {
        if depth > MAX_PERMIT_DEPTH {
            return Err(format!("permit schema nested deeper than {MAX_PERMIT_DEPTH}"));
        }
        let mut schema = Self::new();
        for entry in entries {
            match entry {
                Value::String(name) => schema = schema.field(name.as_str()),
                Value::Array(items) => {
                    let inner = Self::parse_entries(items, depth)?;
                    schema.absorb(inner);
                }
                Value::Object(map) => {
                    for (name, sub) in map {
                        let sub_entries = match sub {
                            Value::Array(items) => items.as_slice(),
                            other => std::slice::from_ref(other),
                        };
                        let inner = Self::parse_entries(sub_entries, depth + 1)?;
                        schema = schema.nested(name.as_str(), inner);
                    }
                }
                other => {
                    return Err(format!(
                        "permit entries must be strings, arrays, or objects, found {other}"
                    ))
                }
            }
        }
        Ok(schema)
    }

    fn absorb(&mut self, other: PermitSchema) {
        for field in other.fields {
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self.nested.extend(other.nested);
    }
}

/// Filter `parent` with the default `_attributes` suffix
pub fn permit(parent: &Value, schema: &PermitSchema) -> Value {
    permit_with_suffix(parent, schema, NESTED_ATTRIBUTES_SUFFIX)
}

/// Filter `parent` down to the fields `schema` allows.
///
/// Non-object input yields an empty object. A nested entry whose value is
/// null or absent is skipped entirely.
pub fn permit_with_suffix(parent: &Value, schema: &PermitSchema, suffix: &str) -> Value {
    filter(parent, schema, suffix, 0)
}

fn filter(parent: &Value, schema: &PermitSchema, suffix: &str, depth: usize) -> Value {
    let mut out = Map::new();
    let Some(source) = parent.as_object() else {
        return Value::Object(out);
    };
    if depth > MAX_PERMIT_DEPTH {
        return Value::Object(out);
    }

    for field in &schema.fields {
        if let Some(value) = source.get(field) {
            if is_permitted_scalar(value) {
                out.insert(field.clone(), value.clone());
            }
        }
    }

    for (key, child_schema) in &schema.nested {
        let child = match source.get(key) {
            None | Some(Value::Null) => continue,
            Some(child) => child,
        };
        let filtered = match child {
            Value::Array(members) => Value::Array(
                members
                    .iter()
                    .map(|member| filter(member, child_schema, suffix, depth + 1))
                    .collect(),
            ),
            other => filter(other, child_schema, suffix, depth + 1),
        };
        out.insert(format!("{key}{suffix}"), filtered);
    }

    Value::Object(out)
}

fn is_permitted_scalar(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(is_scalar),
        other => is_scalar(other),
    }
}
