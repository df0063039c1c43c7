use super::{Record, StorageError, StorageResult};
use crate::constants::messages::REQUIRED;
use crate::directive::ErrorTree;
use crate::utils::is_blank;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A schemaless record backed by a JSON attribute map.
///
/// Validity is derived from a list of required attributes plus any errors
/// attached explicitly with [`AttributeRecord::with_error`].
#[derive(Debug, Clone, Default)]
pub struct AttributeRecord {
    table: String,
    id: Option<i64>,
    attributes: Map<String, Value>,
    associations: BTreeMap<String, Vec<Value>>,
    required: Vec<String>,
    /// When set, writing an attribute outside this list is an error
    columns: Option<Vec<String>>,
    extra_errors: ErrorTree,
    marked_for_destruction: bool,
}

impl AttributeRecord {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Replace all attributes with the entries of a JSON object
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        if let Value::Object(map) = attributes {
            self.attributes = map;
        }
        self
    }

    pub fn with_association(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.associations.insert(name.into(), rows);
        self
    }

    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_error(mut self, key: &str, message: impl Into<String>) -> Self {
        self.extra_errors.add(key, message);
        self
    }

    pub fn mark_for_destruction(&mut self) {
        self.marked_for_destruction = true;
    }

    pub fn marked(mut self) -> Self {
        self.mark_for_destruction();
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

impl Record for AttributeRecord {
    fn table(&self) -> &str {
        &self.table
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn clear_id(&mut self) {
        self.id = None;
    }

    fn attributes(&self) -> Value {
        let mut map = self.attributes.clone();
        if let Some(id) = self.id {
            map.insert("id".to_string(), Value::from(id));
        }
        Value::Object(map)
    }

    fn read_attribute(&self, name: &str) -> Option<Value> {
        match (name, self.id) {
            ("id", Some(id)) => Some(Value::from(id)),
            _ => self.attributes.get(name).cloned(),
        }
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> StorageResult<()> {
        if let Some(columns) = &self.columns {
            if !columns.iter().any(|c| c == name) {
                return Err(StorageError::UnknownAttribute {
                    table: self.table.clone(),
                    attribute: name.to_string(),
                });
            }
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn association_rows(&self, name: &str) -> Option<Vec<Value>> {
        self.associations.get(name).cloned()
    }

    fn validation_errors(&self) -> ErrorTree {
        let mut errors = self.extra_errors.clone();
        for name in &self.required {
            if self.attributes.get(name).map_or(true, is_blank) {
                errors.add(name.as_str(), REQUIRED);
            }
        }
        errors
    }

    fn marked_for_destruction(&self) -> bool {
        self.marked_for_destruction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_attributes_drive_validity() {
        let record = AttributeRecord::new("line_items")
            .with_required(["quantity"])
            .with_attribute("product_id", json!(3));
        assert!(record.is_invalid());
        assert_eq!(
            record.validation_errors().to_value(),
            json!({"quantity": {"base": ["is required"]}})
        );

        let record = record.with_attribute("quantity", json!(2));
        assert!(record.is_valid());
    }

    #[test]
    fn test_column_whitelist_rejects_unknown_attribute() {
        let mut record = AttributeRecord::new("orders").with_columns(["code"]);
        assert!(record.write_attribute("code", json!("A")).is_ok());
        assert!(matches!(
            record.write_attribute("total", json!(1)),
            Err(StorageError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_attributes_include_id_once_persisted() {
        let record = AttributeRecord::new("orders").with_id(9).with_attribute("code", json!("A"));
        assert_eq!(record.attributes(), json!({"id": 9, "code": "A"}));
        assert!(!record.is_new_record());
    }
}
