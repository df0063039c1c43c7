use super::{Record, StorageResult};
use serde_json::Value;

/// Finder helpers used by model loaders to resolve or construct records.
///
/// Implementors provide `find_by` and `build`; the lookup-or-initialize
/// combinators come for free. A `filters` argument is either one filter
/// object or an array of them tried in order.
pub trait Repository {
    type Model: Record + 'static;

    /// First stored record whose attributes match every entry of `filter`
    fn find_by(&self, filter: &Value) -> StorageResult<Option<Self::Model>>;

    /// A new, unsaved record
    fn build(&self) -> Self::Model;

    /// First match for a single filter, or for the first matching filter of
    /// an array
    fn find_one(&self, filters: &Value) -> StorageResult<Option<Self::Model>> {
        match filters {
            Value::Array(candidates) => {
                for filter in candidates {
                    if let Some(found) = self.find_by(filter)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            filter => self.find_by(filter),
        }
    }

    /// Found or new record, then `attributes` assigned over it.
    ///
    /// Without `attributes` the filters themselves are assigned, so a new
    /// record starts out matching what was searched for.
    fn find_and_init(&self, filters: &Value, attributes: Option<&Value>) -> StorageResult<Self::Model> {
        let mut model = match self.find_one(filters)? {
            Some(found) => found,
            None => self.build(),
        };
        assign(&mut model, attributes.unwrap_or(filters))?;
        Ok(model)
    }

    /// Found record untouched, or a new record with `attributes` assigned
    fn find_or_init(&self, filters: &Value, attributes: Option<&Value>) -> StorageResult<Self::Model> {
        if let Some(found) = self.find_one(filters)? {
            return Ok(found);
        }
        let mut model = self.build();
        assign(&mut model, attributes.unwrap_or(filters))?;
        Ok(model)
    }
}

fn assign<M: Record>(model: &mut M, attributes: &Value) -> StorageResult<()> {
    match attributes {
        Value::Array(members) => members.iter().try_for_each(|m| model.assign_attributes(m)),
        other => model.assign_attributes(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AttributeRecord, InMemoryStorage, MemoryRepository};
    use serde_json::json;
    use std::sync::Arc;

    fn repository() -> (Arc<InMemoryStorage>, MemoryRepository) {
        let storage = Arc::new(InMemoryStorage::new());
        storage.seed("customers", json!({"email": "a@example.com", "name": "Ada"}));
        storage.seed("customers", json!({"email": "b@example.com", "name": "Bo"}));
        let repo = MemoryRepository::new(Arc::clone(&storage), "customers");
        (storage, repo)
    }

    #[test]
    fn test_find_one_tries_filters_in_order() {
        let (_, repo) = repository();
        let found = repo
            .find_one(&json!([{"email": "missing@example.com"}, {"email": "b@example.com"}]))
            .unwrap()
            .unwrap();
        assert_eq!(found.get("name"), Some(&json!("Bo")));
    }

    #[test]
    fn test_find_and_init_assigns_filters_when_no_attributes() {
        let (_, repo) = repository();
        let built = repo
            .find_and_init(&json!({"email": "new@example.com"}), None)
            .unwrap();
        assert!(built.is_new_record());
        assert_eq!(built.get("email"), Some(&json!("new@example.com")));
    }

    #[test]
    fn test_find_and_init_overwrites_found_record() {
        let (_, repo) = repository();
        let found = repo
            .find_and_init(&json!({"email": "a@example.com"}), Some(&json!({"name": "Ada L."})))
            .unwrap();
        assert_eq!(found.id(), Some(1));
        assert_eq!(found.get("name"), Some(&json!("Ada L.")));
    }

    #[test]
    fn test_find_or_init_leaves_found_record_untouched() {
        let (_, repo) = repository();
        let found = repo
            .find_or_init(&json!({"email": "a@example.com"}), Some(&json!({"name": "ignored"})))
            .unwrap();
        assert_eq!(found.get("name"), Some(&json!("Ada")));

        let built = repo
            .find_or_init(&json!({"email": "c@example.com"}), Some(&json!({"name": "Cy"})))
            .unwrap();
        assert!(built.is_new_record());
        assert_eq!(built.get("name"), Some(&json!("Cy")));
        assert_eq!(built.get("email"), None);
    }

    #[test]
    fn test_template_applies_to_built_records() {
        let storage = Arc::new(InMemoryStorage::new());
        let repo = MemoryRepository::with_template(
            storage,
            AttributeRecord::new("customers").with_required(["email"]),
        );
        assert!(repo.build().is_invalid());
    }
}
