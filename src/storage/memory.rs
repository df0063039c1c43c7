//! In-memory storage backend.
//!
//! Rows live in a `BTreeMap` keyed by `(table, id)`. `begin` snapshots the
//! rows; `rollback` restores the snapshot and discards pending writes;
//! `commit` moves pending writes to the committed log. Every write is also
//! appended to the attempted log, whatever its outcome.

use super::repository::Repository;
use super::{AttributeRecord, PersistAction, Record, Storage, StorageError, StorageResult};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One write as seen by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteRecord {
    pub action: PersistAction,
    pub table: String,
    pub id: Option<i64>,
    pub attributes: Value,
}

/// Transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

type Rows = BTreeMap<(String, i64), Value>;

#[derive(Debug, Default)]
struct State {
    rows: Rows,
    next_id: i64,
    snapshot: Option<(Rows, i64)>,
    pending: Vec<WriteRecord>,
    attempted: Vec<WriteRecord>,
    committed: Vec<WriteRecord>,
    rejections: HashSet<(String, PersistAction)>,
    faults: HashSet<(String, PersistAction)>,
    stats: TransactionStats,
}

impl State {
    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn record_write(&mut self, write: WriteRecord) {
        if self.in_transaction() {
            self.pending.push(write);
        } else {
            self.committed.push(write);
        }
    }
}

/// Thread-safe in-memory [`Storage`] implementation
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `action` on `table` return `Ok(false)`
    pub fn reject(&self, table: &str, action: PersistAction) {
        self.state.lock().rejections.insert((table.to_string(), action));
    }

    /// Make every `action` on `table` fail with a backend error
    pub fn fault(&self, table: &str, action: PersistAction) {
        self.state.lock().faults.insert((table.to_string(), action));
    }

    /// Insert a row directly, bypassing the write logs. Returns its id.
    pub fn seed(&self, table: &str, attributes: Value) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.rows.insert((table.to_string(), id), attributes);
        id
    }

    pub fn row(&self, table: &str, id: i64) -> Option<Value> {
        self.state.lock().rows.get(&(table.to_string(), id)).cloned()
    }

    /// Every row of `table`, ordered by id
    pub fn rows(&self, table: &str) -> Vec<(i64, Value)> {
        self.state
            .lock()
            .rows
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((_, id), row)| (*id, row.clone()))
            .collect()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().rows.keys().filter(|(t, _)| t == table).count()
    }

    pub fn attempted_writes(&self) -> Vec<WriteRecord> {
        self.state.lock().attempted.clone()
    }

    pub fn committed_writes(&self) -> Vec<WriteRecord> {
        self.state.lock().committed.clone()
    }

    pub fn stats(&self) -> TransactionStats {
        self.state.lock().stats
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().in_transaction()
    }

    /// Shared write path: log the attempt, honour injected failures, then
    /// hand the row map to `apply`.
    fn write<F>(&self, action: PersistAction, record: &mut dyn Record, apply: F) -> StorageResult<bool>
    where
        F: FnOnce(&mut State, &mut dyn Record) -> StorageResult<bool>,
    {
        let mut state = self.state.lock();
        let key = (record.table().to_string(), action);
        state.attempted.push(WriteRecord {
            action,
            table: key.0.clone(),
            id: record.id(),
            attributes: record.attributes(),
        });

        if state.faults.contains(&key) {
            return Err(StorageError::Backend(format!("{action} failed on {}", key.0)));
        }
        if state.rejections.contains(&key) {
            tracing::debug!(table = %key.0, action = %action, "write rejected");
            return Ok(false);
        }
        if action != PersistAction::Destroy && record.is_invalid() {
            tracing::debug!(table = %key.0, action = %action, "invalid record not written");
            return Ok(false);
        }

        let written = apply(&mut *state, &mut *record)?;
        if written {
            state.record_write(WriteRecord {
                action,
                table: key.0,
                id: record.id(),
                attributes: record.attributes(),
            });
        }
        Ok(written)
    }
}

fn insert(state: &mut State, record: &mut dyn Record) -> StorageResult<bool> {
    let id = match record.id() {
        Some(id) => id,
        None => {
            state.next_id += 1;
            state.next_id
        }
    };
    record.assign_id(id);
    state.next_id = state.next_id.max(id);
    state
        .rows
        .insert((record.table().to_string(), id), stored_row(record));
    Ok(true)
}

fn overwrite(state: &mut State, record: &mut dyn Record) -> StorageResult<bool> {
    let table = record.table().to_string();
    let id = record.id().ok_or_else(|| {
        StorageError::Backend(format!("cannot update unsaved {table} record"))
    })?;
    match state.rows.get_mut(&(table.clone(), id)) {
        Some(row) => {
            *row = stored_row(record);
            Ok(true)
        }
        None => Err(StorageError::RecordNotFound { table, id }),
    }
}

/// Row contents exclude the id, which is part of the key
fn stored_row(record: &dyn Record) -> Value {
    let mut row = record.attributes();
    if let Some(map) = row.as_object_mut() {
        map.remove("id");
    }
    row
}

impl Storage for InMemoryStorage {
    fn begin(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.in_transaction() {
            return Err(StorageError::TransactionAlreadyOpen);
        }
        state.snapshot = Some((state.rows.clone(), state.next_id));
        state.stats.begun += 1;
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.take().is_none() {
            return Err(StorageError::NoTransaction);
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        state.stats.committed += 1;
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        let (rows, next_id) = state.snapshot.take().ok_or(StorageError::NoTransaction)?;
        state.rows = rows;
        state.next_id = next_id;
        state.pending.clear();
        state.stats.rolled_back += 1;
        Ok(())
    }

    fn save(&self, record: &mut dyn Record) -> StorageResult<bool> {
        self.write(PersistAction::Save, record, |state, record| {
            if record.is_new_record() {
                insert(state, record)
            } else {
                overwrite(state, record)
            }
        })
    }

    fn update(&self, record: &mut dyn Record) -> StorageResult<bool> {
        self.write(PersistAction::Update, record, overwrite)
    }

    fn create(&self, record: &mut dyn Record) -> StorageResult<bool> {
        self.write(PersistAction::Create, record, |state, record| {
            let exists = record
                .id()
                .is_some_and(|id| state.rows.contains_key(&(record.table().to_string(), id)));
            if exists {
                return Ok(false);
            }
            insert(state, record)
        })
    }

    fn destroy(&self, record: &mut dyn Record) -> StorageResult<bool> {
        self.write(PersistAction::Destroy, record, |state, record| match record.id() {
            None => Ok(true),
            Some(id) => Ok(state
                .rows
                .remove(&(record.table().to_string(), id))
                .is_some()),
        })
    }
}

/// [`Repository`] over one table of an [`InMemoryStorage`].
///
/// Found and built records are clones of a template, so required attributes
/// and column lists configured on the template apply to both.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    storage: Arc<InMemoryStorage>,
    template: AttributeRecord,
}

impl MemoryRepository {
    pub fn new(storage: Arc<InMemoryStorage>, table: &str) -> Self {
        Self::with_template(storage, AttributeRecord::new(table))
    }

    pub fn with_template(storage: Arc<InMemoryStorage>, template: AttributeRecord) -> Self {
        Self { storage, template }
    }

    fn matches(row: &Value, filter: &Value) -> bool {
        match filter.as_object() {
            Some(conditions) => conditions.iter().all(|(key, expected)| row.get(key) == Some(expected)),
            None => false,
        }
    }
}

impl Repository for MemoryRepository {
    type Model = AttributeRecord;

    fn find_by(&self, filter: &Value) -> StorageResult<Option<AttributeRecord>> {
        let table = self.template.table().to_string();
        let found = self.storage.rows(&table).into_iter().find(|(id, row)| {
            let mut candidate = row.clone();
            if let Some(map) = candidate.as_object_mut() {
                map.insert("id".to_string(), Value::from(*id));
            }
            Self::matches(&candidate, filter)
        });
        Ok(found.map(|(id, row)| self.template.clone().with_id(id).with_attributes(row)))
    }

    fn build(&self) -> AttributeRecord {
        self.template.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_assigns_ids_and_updates_existing() {
        let storage = InMemoryStorage::new();
        let mut record = AttributeRecord::new("orders").with_attribute("code", json!("A"));

        assert_eq!(storage.save(&mut record), Ok(true));
        assert_eq!(record.id(), Some(1));

        record.write_attribute("code", json!("B")).unwrap();
        assert_eq!(storage.save(&mut record), Ok(true));
        assert_eq!(storage.row("orders", 1), Some(json!({"code": "B"})));
        assert_eq!(storage.row_count("orders"), 1);
    }

    #[test]
    fn test_invalid_record_not_saved() {
        let storage = InMemoryStorage::new();
        let mut record = AttributeRecord::new("orders").with_required(["code"]);

        assert_eq!(storage.save(&mut record), Ok(false));
        assert_eq!(storage.attempted_writes().len(), 1);
        assert!(storage.committed_writes().is_empty());
    }

    #[test]
    fn test_rollback_restores_rows_and_ids() {
        let storage = InMemoryStorage::new();
        storage.seed("orders", json!({"code": "seed"}));

        storage.begin().unwrap();
        let mut record = AttributeRecord::new("orders");
        storage.save(&mut record).unwrap();
        assert_eq!(storage.row_count("orders"), 2);
        storage.rollback().unwrap();

        assert_eq!(storage.row_count("orders"), 1);
        assert!(storage.committed_writes().is_empty());
        assert_eq!(storage.attempted_writes().len(), 1);

        let mut next = AttributeRecord::new("orders");
        storage.save(&mut next).unwrap();
        assert_eq!(next.id(), Some(2));
    }

    #[test]
    fn test_nested_begin_rejected() {
        let storage = InMemoryStorage::new();
        storage.begin().unwrap();
        assert_eq!(storage.begin(), Err(StorageError::TransactionAlreadyOpen));
        assert_eq!(storage.commit(), Ok(()));
        assert_eq!(storage.commit(), Err(StorageError::NoTransaction));
    }

    #[test]
    fn test_injected_rejection_and_fault() {
        let storage = InMemoryStorage::new();
        storage.reject("orders", PersistAction::Save);
        storage.fault("orders", PersistAction::Create);

        let mut record = AttributeRecord::new("orders");
        assert_eq!(storage.save(&mut record), Ok(false));
        assert!(matches!(storage.create(&mut record), Err(StorageError::Backend(_))));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let storage = InMemoryStorage::new();
        let mut record = AttributeRecord::new("orders").with_id(42);
        assert_eq!(
            storage.update(&mut record),
            Err(StorageError::RecordNotFound {
                table: "orders".to_string(),
                id: 42
            })
        );
    }

    #[test]
    fn test_destroy_removes_row() {
        let storage = InMemoryStorage::new();
        let id = storage.seed("orders", json!({"code": "A"}));
        let mut record = AttributeRecord::new("orders").with_id(id);

        assert_eq!(storage.destroy(&mut record), Ok(true));
        assert_eq!(storage.row_count("orders"), 0);
        assert_eq!(storage.destroy(&mut record), Ok(false));
    }

    #[test]
    fn test_memory_repository_finds_by_attributes() {
        let storage = Arc::new(InMemoryStorage::new());
        let id = storage.seed("customers", json!({"email": "a@example.com"}));
        let repo = MemoryRepository::new(Arc::clone(&storage), "customers");

        let found = repo.find_by(&json!({"email": "a@example.com"})).unwrap().unwrap();
        assert_eq!(found.id(), Some(id));
        assert!(repo.find_by(&json!({"email": "b@example.com"})).unwrap().is_none());
        assert!(repo.find_by(&json!({"id": id})).unwrap().is_some());
    }
}
