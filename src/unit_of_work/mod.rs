//! # Unit of Work
//!
//! Batches persistence operations so they commit or roll back together.
//!
//! Two execution modes share one interface:
//!
//! - **Deferred** (default): operations are queued and replayed in order when
//!   the unit commits. The first operation that returns `false` or errors
//!   stops the replay.
//! - **Immediate**: each operation writes through as soon as it is enqueued,
//!   inside the already-open transaction. The first failure is remembered and
//!   every later operation is skipped.
//!
//! Either way, a failure rolls back every write made inside the transaction,
//! including writes from operations that had already succeeded.
//!
//! ```rust
//! use legatus_core::storage::{AttributeRecord, InMemoryStorage, RecordRef};
//! use legatus_core::unit_of_work::{UnitOfWork, UnitOfWorkMode};
//! use serde_json::json;
//!
//! let storage = InMemoryStorage::new();
//! let order = RecordRef::new(AttributeRecord::new("orders").with_attribute("code", json!("A1")));
//!
//! UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
//!     uow.save([order.clone()]);
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(storage.row_count("orders"), 1);
//! ```

pub mod denormalize;
pub mod errors;

pub use denormalize::{Aggregate, DenormalizeRule, Denormalization};
pub use errors::{PersistResult, PersistenceError};

use crate::constants::events;
use crate::logging::log_persistence_operation;
use crate::storage::{Loaded, PersistAction, Record, RecordRef, Storage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How operations reach the storage layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfWorkMode {
    #[default]
    Deferred,
    Immediate,
}

impl fmt::Display for UnitOfWorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => write!(f, "deferred"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

impl std::str::FromStr for UnitOfWorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deferred" => Ok(Self::Deferred),
            "immediate" => Ok(Self::Immediate),
            _ => Err(format!("Invalid unit of work mode: {s}")),
        }
    }
}

/// A record or a collection of records an operation applies to
#[derive(Debug, Clone)]
pub enum Target {
    One(RecordRef),
    Many(Vec<RecordRef>),
}

impl Target {
    pub fn records(&self) -> &[RecordRef] {
        match self {
            Self::One(record) => std::slice::from_ref(record),
            Self::Many(records) => records,
        }
    }
}

impl From<RecordRef> for Target {
    fn from(record: RecordRef) -> Self {
        Self::One(record)
    }
}

impl From<&RecordRef> for Target {
    fn from(record: &RecordRef) -> Self {
        Self::One(record.clone())
    }
}

impl From<Vec<RecordRef>> for Target {
    fn from(records: Vec<RecordRef>) -> Self {
        Self::Many(records)
    }
}

/// An empty slot becomes an empty collection, which trivially succeeds
impl From<&Loaded> for Target {
    fn from(loaded: &Loaded) -> Self {
        match loaded {
            Loaded::None => Self::Many(Vec::new()),
            Loaded::One(record) => Self::One(record.clone()),
            Loaded::Many(records) => Self::Many(records.clone()),
        }
    }
}

/// One queued persistence step
#[derive(Debug, Clone)]
pub enum Operation {
    /// Apply one action to every target record
    Apply {
        action: PersistAction,
        targets: Vec<Target>,
    },
    /// Destroy records marked for destruction, save the rest
    Persist { targets: Vec<Target> },
    /// Recompute aggregate fields, then save
    Denormalize {
        record: RecordRef,
        schema: Denormalization,
    },
}

impl Operation {
    pub fn name(&self) -> String {
        match self {
            Self::Apply { action, .. } => action.to_string(),
            Self::Persist { .. } => "persist".to_string(),
            Self::Denormalize { .. } => "denormalize".to_string(),
        }
    }

    /// Run against `storage`, stopping at the first record that fails.
    ///
    /// Every record that was new before its write is pushed onto `fresh` so
    /// a rollback can return it to the new-record state.
    pub fn run(&self, storage: &dyn Storage, fresh: &mut Vec<RecordRef>) -> PersistResult<bool> {
        match self {
            Self::Apply { action, targets } => {
                for record in targets.iter().flat_map(Target::records) {
                    let mut guard = record.lock();
                    track_fresh(record, &*guard, fresh);
                    if !storage.apply(*action, &mut *guard)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Persist { targets } => {
                for record in targets.iter().flat_map(Target::records) {
                    let mut guard = record.lock();
                    let action = if guard.marked_for_destruction() {
                        PersistAction::Destroy
                    } else {
                        PersistAction::Save
                    };
                    track_fresh(record, &*guard, fresh);
                    if !storage.apply(action, &mut *guard)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Denormalize { record, schema } => {
                let mut guard = record.lock();
                schema.apply(&mut *guard)?;
                track_fresh(record, &*guard, fresh);
                Ok(storage.save(&mut *guard)?)
            }
        }
    }
}

fn track_fresh(record: &RecordRef, current: &dyn Record, fresh: &mut Vec<RecordRef>) {
    if current.is_new_record() && !fresh.iter().any(|seen| seen.ptr_eq(record)) {
        fresh.push(record.clone());
    }
}

/// A batch of persistence operations bound to one storage transaction
pub struct UnitOfWork<'s> {
    storage: &'s dyn Storage,
    mode: UnitOfWorkMode,
    queued: Vec<Operation>,
    executed: usize,
    failure: Option<PersistenceError>,
    fresh: Vec<RecordRef>,
}

impl fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("mode", &self.mode)
            .field("queued", &self.queued.len())
            .field("executed", &self.executed)
            .field("failure", &self.failure)
            .finish()
    }
}

impl<'s> UnitOfWork<'s> {
    /// A standalone deferred unit; [`UnitOfWork::commit`] opens its own
    /// transaction
    pub fn new(storage: &'s dyn Storage) -> Self {
        Self::with_mode(storage, UnitOfWorkMode::Deferred)
    }

    fn with_mode(storage: &'s dyn Storage, mode: UnitOfWorkMode) -> Self {
        Self {
            storage,
            mode,
            queued: Vec::new(),
            executed: 0,
            failure: None,
            fresh: Vec::new(),
        }
    }

    /// Open a transaction, hand a unit of work to `block`, and commit.
    ///
    /// The transaction commits only if `block` returns `Ok` and every
    /// operation succeeded; otherwise all writes are rolled back and the
    /// first failure is returned. Records inserted before a rollback lose
    /// their assigned ids again.
    pub fn transaction<T, F>(storage: &'s dyn Storage, mode: UnitOfWorkMode, block: F) -> PersistResult<T>
    where
        F: FnOnce(&mut UnitOfWork<'s>) -> PersistResult<T>,
    {
        let mut uow = Self::with_mode(storage, mode);
        let result = storage.run_in_transaction(|| {
            let value = block(&mut uow)?;
            uow.finish()?;
            Ok(value)
        });
        if result.is_err() {
            uow.restore_fresh();
        }
        log_outcome(mode, &result);
        result
    }

    pub fn mode(&self) -> UnitOfWorkMode {
        self.mode
    }

    /// Operations queued (deferred) or already run (immediate)
    pub fn len(&self) -> usize {
        match self.mode {
            UnitOfWorkMode::Deferred => self.queued.len(),
            UnitOfWorkMode::Immediate => self.executed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First failure seen in immediate mode
    pub fn failure(&self) -> Option<&PersistenceError> {
        self.failure.as_ref()
    }

    pub fn save<I, T>(&mut self, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        self.apply(PersistAction::Save, targets)
    }

    pub fn update<I, T>(&mut self, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        self.apply(PersistAction::Update, targets)
    }

    pub fn create<I, T>(&mut self, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        self.apply(PersistAction::Create, targets)
    }

    pub fn destroy<I, T>(&mut self, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        self.apply(PersistAction::Destroy, targets)
    }

    /// Save each record, or destroy it when marked for destruction
    pub fn persist<I, T>(&mut self, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.enqueue(Operation::Persist { targets })
    }

    /// Recompute `schema`'s fields on `record`, then save it
    pub fn denormalize(&mut self, record: impl Into<RecordRef>, schema: Denormalization) -> &mut Self {
        self.enqueue(Operation::Denormalize {
            record: record.into(),
            schema,
        })
    }

    fn apply<I, T>(&mut self, action: PersistAction, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Target>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.enqueue(Operation::Apply { action, targets })
    }

    pub fn enqueue(&mut self, operation: Operation) -> &mut Self {
        match self.mode {
            UnitOfWorkMode::Deferred => self.queued.push(operation),
            UnitOfWorkMode::Immediate => {
                self.executed += 1;
                if self.failure.is_some() {
                    tracing::debug!(operation = %operation.name(), "skipped after earlier failure");
                } else if let Err(e) = run_at(self.storage, &operation, self.executed, &mut self.fresh) {
                    self.failure = Some(e);
                }
            }
        }
        self
    }

    /// Replay the queue inside a fresh transaction
    pub fn commit(mut self) -> PersistResult<()> {
        let storage = self.storage;
        let mode = self.mode;
        let result = storage.run_in_transaction(|| self.finish());
        if result.is_err() {
            self.restore_fresh();
        }
        log_outcome(mode, &result);
        result
    }

    fn finish(&mut self) -> PersistResult<()> {
        match self.mode {
            UnitOfWorkMode::Deferred => {
                for (index, operation) in self.queued.iter().enumerate() {
                    run_at(self.storage, operation, index + 1, &mut self.fresh)?;
                }
                Ok(())
            }
            UnitOfWorkMode::Immediate => self.failure.take().map_or(Ok(()), Err),
        }
    }

    /// Undo id assignment on records whose inserts were rolled back
    fn restore_fresh(&mut self) {
        for record in self.fresh.drain(..) {
            record.lock().clear_id();
        }
    }
}

fn run_at(
    storage: &dyn Storage,
    operation: &Operation,
    position: usize,
    fresh: &mut Vec<RecordRef>,
) -> PersistResult<()> {
    if operation.run(storage, fresh)? {
        Ok(())
    } else {
        Err(PersistenceError::OperationFailed {
            action: operation.name(),
            position,
        })
    }
}

fn log_outcome<T>(mode: UnitOfWorkMode, result: &PersistResult<T>) {
    match result {
        Ok(_) => log_persistence_operation(
            events::UNIT_OF_WORK_COMMITTED,
            &mode.to_string(),
            "committed",
            None,
        ),
        Err(e) => log_persistence_operation(
            events::UNIT_OF_WORK_ROLLED_BACK,
            &mode.to_string(),
            "rolled_back",
            Some(&e.to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AttributeRecord, InMemoryStorage};
    use serde_json::json;

    fn record(table: &str) -> RecordRef {
        RecordRef::new(AttributeRecord::new(table).with_attribute("name", json!(table)))
    }

    #[test]
    fn test_deferred_failure_rolls_back_earlier_writes() {
        let storage = InMemoryStorage::new();
        storage.reject("payments", PersistAction::Save);

        let result = UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.save([record("orders")]);
            uow.save([record("payments")]);
            uow.save([record("shipments")]);
            Ok(())
        });

        assert_eq!(
            result,
            Err(PersistenceError::OperationFailed {
                action: "save".to_string(),
                position: 2
            })
        );
        assert_eq!(storage.attempted_writes().len(), 2);
        assert!(storage.committed_writes().is_empty());
        assert_eq!(storage.row_count("orders"), 0);
        assert_eq!(storage.row_count("shipments"), 0);
    }

    #[test]
    fn test_rollback_returns_inserted_records_to_new_state() {
        let storage = InMemoryStorage::new();
        storage.reject("payments", PersistAction::Save);
        let order = record("orders");

        let result = UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.save([&order]);
            uow.save([record("payments")]);
            Ok(())
        });

        assert!(matches!(result, Err(PersistenceError::OperationFailed { position: 2, .. })));
        assert_eq!(storage.row_count("orders"), 0);
        assert!(order.lock().is_new_record());
        assert_eq!(order.attributes(), json!({"name": "orders"}));

        UnitOfWork::transaction(&storage, UnitOfWorkMode::Immediate, |uow| {
            uow.save([&order]);
            Ok(())
        })
        .unwrap();
        assert_eq!(storage.row_count("orders"), 1);
        assert!(order.lock().id().is_some());
    }

    #[test]
    fn test_rollback_keeps_ids_of_existing_records() {
        let storage = InMemoryStorage::new();
        let id = storage.seed("orders", json!({"name": "old"}));
        let existing = RecordRef::new(AttributeRecord::new("orders").with_id(id));

        let result: PersistResult<()> = UnitOfWork::transaction(&storage, UnitOfWorkMode::Immediate, |uow| {
            uow.save([&existing]);
            Err(PersistenceError::handler_failed("out of stock"))
        });

        assert!(result.is_err());
        assert_eq!(existing.lock().id(), Some(id));
        assert_eq!(storage.row("orders", id), Some(json!({"name": "old"})));
    }

    #[test]
    fn test_immediate_mode_skips_after_failure() {
        let storage = InMemoryStorage::new();
        storage.reject("payments", PersistAction::Save);

        let result = UnitOfWork::transaction(&storage, UnitOfWorkMode::Immediate, |uow| {
            uow.save([record("orders")]);
            assert_eq!(storage.row_count("orders"), 1);
            uow.save([record("payments")]);
            uow.save([record("shipments")]);
            assert!(uow.failure().is_some());
            Ok(())
        });

        assert!(matches!(result, Err(PersistenceError::OperationFailed { position: 2, .. })));
        assert_eq!(storage.attempted_writes().len(), 2);
        assert_eq!(storage.row_count("orders"), 0);
    }

    #[test]
    fn test_block_error_rolls_back() {
        let storage = InMemoryStorage::new();
        let result: PersistResult<()> = UnitOfWork::transaction(&storage, UnitOfWorkMode::Immediate, |uow| {
            uow.save([record("orders")]);
            Err(PersistenceError::handler_failed("out of stock"))
        });

        assert_eq!(result, Err(PersistenceError::handler_failed("out of stock")));
        assert_eq!(storage.row_count("orders"), 0);
        assert_eq!(storage.stats().rolled_back, 1);
    }

    #[test]
    fn test_multiple_targets_short_circuit() {
        let storage = InMemoryStorage::new();
        let invalid = RecordRef::new(AttributeRecord::new("line_items").with_required(["quantity"]));
        let never = record("line_items");

        let result = UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.create([invalid.clone(), never.clone()]);
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(storage.attempted_writes().len(), 1);
        assert!(never.lock().is_new_record());
    }

    #[test]
    fn test_persist_destroys_marked_and_saves_rest() {
        let storage = InMemoryStorage::new();
        let doomed_id = storage.seed("line_items", json!({"sku": "old"}));
        let doomed = RecordRef::new(AttributeRecord::new("line_items").with_id(doomed_id).marked());
        let fresh = record("line_items");
        let order = record("orders");

        UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.persist([Target::from(vec![doomed.clone(), fresh.clone()]), Target::from(&order)]);
            Ok(())
        })
        .unwrap();

        let actions: Vec<_> = storage.committed_writes().iter().map(|w| w.action).collect();
        assert_eq!(
            actions,
            vec![PersistAction::Destroy, PersistAction::Save, PersistAction::Save]
        );
        assert!(storage.row("line_items", doomed_id).is_none());
        assert_eq!(storage.row_count("orders"), 1);
    }

    #[test]
    fn test_denormalize_then_save() {
        let storage = InMemoryStorage::new();
        let order = RecordRef::new(
            AttributeRecord::new("orders")
                .with_association("line_items", vec![json!({"amount": 40}), json!({"amount": 2})]),
        );

        UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.denormalize(
                order.clone(),
                Denormalization::new().rule("total", "line_items", Aggregate::Sum, "amount"),
            );
            Ok(())
        })
        .unwrap();

        assert_eq!(order.lock().read_attribute("total"), Some(json!(42)));
        let id = order.lock().id().unwrap();
        assert_eq!(storage.row("orders", id), Some(json!({"total": 42})));
    }

    #[test]
    fn test_standalone_commit_opens_transaction() {
        let storage = InMemoryStorage::new();
        let mut uow = UnitOfWork::new(&storage);
        uow.save([record("orders")]).update(Vec::<RecordRef>::new());
        assert_eq!(uow.len(), 2);

        uow.commit().unwrap();
        assert_eq!(storage.stats().committed, 1);
        assert_eq!(storage.row_count("orders"), 1);
    }

    #[test]
    fn test_empty_loaded_target_is_trivially_saved() {
        let storage = InMemoryStorage::new();
        let result = UnitOfWork::transaction(&storage, UnitOfWorkMode::Deferred, |uow| {
            uow.save([&Loaded::None]);
            Ok(())
        });
        assert!(result.is_ok());
    }
}
