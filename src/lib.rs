#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Legatus Core
//!
//! Directive execution engine for request handling.
//!
//! ## Overview
//!
//! A **directive** is the object a controller hands a request to. It derives
//! typed properties from raw input, then runs a fixed lifecycle:
//!
//! 1. `clean` flags blank required properties
//! 2. `load` resolves related records through loader hooks
//! 3. `validate` collects the records' validation errors into one tree
//! 4. `persist` runs transaction handlers inside an all-or-nothing unit of work
//!
//! Every stage is bracketed by optional before/after gates. A stage that
//! fails, or a gate that returns false, stops the run and leaves the
//! accumulated errors on the directive.
//!
//! ## Module Organization
//!
//! - [`chain`] - Property chains with null short-circuiting
//! - [`directive`] - Schemas, the lifecycle, hooks, error trees and permit filtering
//! - [`unit_of_work`] - Transactional persistence and denormalization
//! - [`storage`] - Record and storage traits plus an in-memory backend
//! - [`registry`] - Action name to directive schema lookup
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust
//! use legatus_core::{Chain, DirectiveSchema, Directive, Stage, Phase};
//! use legatus_core::storage::{AttributeRecord, InMemoryStorage, RecordRef};
//! use legatus_core::directive::Hook;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = DirectiveSchema::builder("create_note")
//!     .property("title", Chain::builder().step("fetch", [json!("title")]).then("strip").build()?)
//!     .model("note", Hook::loader(|d| {
//!         let record = AttributeRecord::new("notes")
//!             .with_attribute("title", d.prop("title").cloned().unwrap_or_default());
//!         Ok(RecordRef::new(record).into())
//!     }))
//!     .validate(["note"])
//!     .transaction(|uow, d| {
//!         uow.save(d.model("note"));
//!         Ok(())
//!     })
//!     .callback(Stage::Persist, Phase::Before, |d| d.is_valid())
//!     .build()?;
//!
//! let storage = InMemoryStorage::new();
//! let mut directive = Directive::new(schema, json!({"title": "  hello "}))?;
//! directive.execute(&storage)?;
//! assert_eq!(storage.row_count("notes"), 1);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod constants;
pub mod directive;
pub mod error;
pub mod logging;
pub mod registry;
pub mod storage;
pub mod unit_of_work;
pub mod utils;

pub use chain::{Chain, ChainBuilder, ChainError, OperationRegistry};
pub use config::{ConfigManager, LegatusConfig};
pub use directive::{
    Directive, DirectiveSchema, DirectiveSettings, DirectiveState, ErrorTree, ExecutionError,
    Phase, Stage,
};
pub use error::{LegatusError, Result};
pub use registry::{DirectiveRegistry, RunOutcome};
pub use storage::{Loaded, Record, RecordRef, Storage};
pub use unit_of_work::{PersistenceError, UnitOfWork, UnitOfWorkMode};
