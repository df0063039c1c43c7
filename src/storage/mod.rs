//! # Storage Layer
//!
//! The directive engine never talks to a database directly. Persistence goes
//! through two seams:
//!
//! - [`Record`]: an entity that knows its table, id, attributes, associated
//!   rows and its own validation errors.
//! - [`Storage`]: per-record `save`/`update`/`create`/`destroy` plus an
//!   explicit transaction scope.
//!
//! [`InMemoryStorage`] is a complete implementation used by tests and
//! examples. It records attempted and committed writes separately so that
//! rollback behaviour can be observed.

pub mod memory;
pub mod record;
pub mod repository;

pub use memory::{InMemoryStorage, MemoryRepository, TransactionStats, WriteRecord};
pub use record::AttributeRecord;
pub use repository::Repository;

use crate::directive::ErrorTree;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Faults raised by a storage backend.
///
/// A rejected write (for example saving an invalid record) is not a fault;
/// it is reported as `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("No transaction is open")]
    NoTransaction,

    #[error("A transaction is already open")]
    TransactionAlreadyOpen,

    #[error("Record not found: {table}#{id}")]
    RecordNotFound { table: String, id: i64 },

    #[error("Unknown attribute {attribute} for {table}")]
    UnknownAttribute { table: String, attribute: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Per-record persistence actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistAction {
    Save,
    Update,
    Create,
    Destroy,
}

impl fmt::Display for PersistAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
            Self::Update => write!(f, "update"),
            Self::Create => write!(f, "create"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// A persistable entity
pub trait Record: Send {
    fn table(&self) -> &str;

    fn id(&self) -> Option<i64>;

    fn assign_id(&mut self, id: i64);

    /// Return to the new-record state after a rolled-back insert
    fn clear_id(&mut self);

    /// Current attributes as a JSON object
    fn attributes(&self) -> Value;

    fn read_attribute(&self, name: &str) -> Option<Value> {
        self.attributes().get(name).cloned()
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> StorageResult<()>;

    /// Assign every entry of a JSON object. Non-object input is ignored.
    fn assign_attributes(&mut self, attributes: &Value) -> StorageResult<()> {
        if let Some(map) = attributes.as_object() {
            for (name, value) in map {
                self.write_attribute(name, value.clone())?;
            }
        }
        Ok(())
    }

    /// Rows of a named association, `None` when the association is unknown
    fn association_rows(&self, name: &str) -> Option<Vec<Value>>;

    /// This record's own error tree; empty when valid
    fn validation_errors(&self) -> ErrorTree;

    fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    fn marked_for_destruction(&self) -> bool {
        false
    }

    fn is_new_record(&self) -> bool {
        self.id().is_none()
    }
}

/// Shared handle to a record.
///
/// Loaders hand records to the directive, transaction handlers hand the same
/// records to the unit of work, and the caller may still hold them after the
/// run. Cloning the handle shares the record.
#[derive(Clone)]
pub struct RecordRef(Arc<Mutex<dyn Record>>);

impl RecordRef {
    pub fn new<R: Record + 'static>(record: R) -> Self {
        Self(Arc::new(Mutex::new(record)))
    }

    pub fn lock(&self) -> MutexGuard<'_, dyn Record + 'static> {
        self.0.lock()
    }

    /// Whether two handles point at the same record
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn attributes(&self) -> Value {
        self.lock().attributes()
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.lock();
        f.debug_struct("RecordRef")
            .field("table", &record.table())
            .field("id", &record.id())
            .finish()
    }
}

/// What a model loader resolved
#[derive(Debug, Clone, Default)]
pub enum Loaded {
    #[default]
    None,
    One(RecordRef),
    Many(Vec<RecordRef>),
}

impl Loaded {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Every record held, in order
    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Self::None => Vec::new(),
            Self::One(record) => vec![record.clone()],
            Self::Many(records) => records.clone(),
        }
    }

    pub fn as_one(&self) -> Option<&RecordRef> {
        match self {
            Self::One(record) => Some(record),
            _ => None,
        }
    }

    /// Attributes of the held record(s): null, an object, or an array
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::One(record) => record.attributes(),
            Self::Many(records) => Value::Array(records.iter().map(RecordRef::attributes).collect()),
        }
    }
}

impl From<RecordRef> for Loaded {
    fn from(record: RecordRef) -> Self {
        Self::One(record)
    }
}

impl From<Option<RecordRef>> for Loaded {
    fn from(record: Option<RecordRef>) -> Self {
        record.map_or(Self::None, Self::One)
    }
}

impl From<Vec<RecordRef>> for Loaded {
    fn from(records: Vec<RecordRef>) -> Self {
        Self::Many(records)
    }
}

/// A storage backend with an explicit transaction scope
pub trait Storage: Send + Sync {
    fn begin(&self) -> StorageResult<()>;

    fn commit(&self) -> StorageResult<()>;

    fn rollback(&self) -> StorageResult<()>;

    fn save(&self, record: &mut dyn Record) -> StorageResult<bool>;

    fn update(&self, record: &mut dyn Record) -> StorageResult<bool>;

    fn create(&self, record: &mut dyn Record) -> StorageResult<bool>;

    fn destroy(&self, record: &mut dyn Record) -> StorageResult<bool>;

    fn apply(&self, action: PersistAction, record: &mut dyn Record) -> StorageResult<bool> {
        match action {
            PersistAction::Save => self.save(record),
            PersistAction::Update => self.update(record),
            PersistAction::Create => self.create(record),
            PersistAction::Destroy => self.destroy(record),
        }
    }
}

impl<'a> dyn Storage + 'a {
    /// Run `body` inside one transaction.
    ///
    /// Commits when `body` returns `Ok`; rolls back and returns the original
    /// error otherwise. A failed rollback is logged, never reported over the
    /// error that caused it.
    pub fn run_in_transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<StorageError>,
    {
        self.begin()?;
        match body() {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback_quietly();
                    Err(e.into())
                }
            },
            Err(e) => {
                self.rollback_quietly();
                Err(e)
            }
        }
    }

    fn rollback_quietly(&self) {
        if let Err(e) = self.rollback() {
            tracing::error!(error = %e, "rollback failed");
        }
    }
}
