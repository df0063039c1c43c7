//! # Directive Registry
//!
//! Maps action names to immutable directive schemas. A controller layer
//! looks up the schema for an incoming action, instantiates a directive from
//! the request payload, and runs it; [`DirectiveRegistry::run`] does all
//! three and folds the result into a [`RunOutcome`].
//!
//! ```rust
//! use legatus_core::chain::Chain;
//! use legatus_core::directive::DirectiveSchema;
//! use legatus_core::registry::{DirectiveRegistry, RunOutcome};
//! use legatus_core::storage::InMemoryStorage;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DirectiveRegistry::new();
//! registry.register(
//!     "notes#create",
//!     DirectiveSchema::builder("create_note")
//!         .property("title", Chain::builder().step("fetch", [json!("title")]).build()?)
//!         .build()?,
//! )?;
//!
//! let outcome = registry.run("notes#create", json!({"title": "hi"}), &InMemoryStorage::new())?;
//! assert!(matches!(outcome, RunOutcome::Completed { .. }));
//! # Ok(())
//! # }
//! ```

use crate::directive::{Directive, DirectiveSchema, DirectiveSnapshot, ErrorTree, Stage};
use crate::error::{LegatusError, Result};
use crate::logging::log_registry_operation;
use crate::storage::Storage;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Result of running a registered directive
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage ran and the unit of work committed
    Completed { snapshot: DirectiveSnapshot },
    /// The run stopped; `errors` holds whatever was recorded before it did
    Rejected {
        errors: ErrorTree,
        reason: String,
        stage: Option<Stage>,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Response body: the snapshot on success, the error tree otherwise
    pub fn to_value(&self) -> Value {
        match self {
            Self::Completed { snapshot } => serde_json::to_value(snapshot).unwrap_or(Value::Null),
            Self::Rejected { errors, .. } => errors.to_value(),
        }
    }
}

/// Concurrent map from action name to directive schema
#[derive(Debug, Default)]
pub struct DirectiveRegistry {
    schemas: DashMap<String, Arc<DirectiveSchema>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema` under `action`. Each action may be bound once.
    pub fn register(&self, action: impl Into<String>, schema: Arc<DirectiveSchema>) -> Result<()> {
        match self.schemas.entry(action.into()) {
            Entry::Occupied(existing) => {
                let reason = format!("already bound to directive {}", existing.get().name());
                log_registry_operation("register", existing.key(), schema.name(), "rejected", Some(&reason));
                Err(LegatusError::registry(format!("action {} {reason}", existing.key())))
            }
            Entry::Vacant(slot) => {
                log_registry_operation("register", slot.key(), schema.name(), "registered", None);
                slot.insert(schema);
                Ok(())
            }
        }
    }

    pub fn get(&self, action: &str) -> Option<Arc<DirectiveSchema>> {
        self.schemas.get(action).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, action: &str) -> bool {
        self.schemas.contains_key(action)
    }

    /// Registered action names, sorted
    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.schemas.iter().map(|entry| entry.key().clone()).collect();
        actions.sort();
        actions
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Build a directive instance for `action` from `input`
    pub fn instantiate(&self, action: &str, input: Value) -> Result<Directive> {
        let schema = self
            .get(action)
            .ok_or_else(|| LegatusError::registry(format!("no directive bound to action {action}")))?;
        Ok(Directive::new(schema, input)?)
    }

    /// Instantiate and execute the directive for `action`.
    ///
    /// Lifecycle failures become [`RunOutcome::Rejected`]; only an unknown
    /// action or a failing property chain is an `Err`.
    pub fn run(&self, action: &str, input: Value, storage: &dyn Storage) -> Result<RunOutcome> {
        let mut directive = self.instantiate(action, input)?;
        let outcome = match directive.execute(storage) {
            Ok(()) => RunOutcome::Completed {
                snapshot: directive.snapshot(),
            },
            Err(e) => RunOutcome::Rejected {
                errors: directive.errors().clone(),
                reason: e.to_string(),
                stage: e.stage(),
            },
        };
        debug!(action, completed = outcome.is_completed(), "directive run finished");
        Ok(outcome)
    }
}
