//! # Directives
//!
//! A directive is one unit of request-handling logic. Its [`DirectiveSchema`]
//! declares derived properties, model loaders, validation targets,
//! transaction handlers and stage callbacks; a [`Directive`] instance applies
//! that schema to one raw input and runs the lifecycle exactly once:
//!
//! ```text
//! init -> properties_computed -> cleaned -> loaded -> validated -> persisted
//!                 \________________\__________\__________\-------> aborted
//! ```
//!
//! Each stage is wrapped in a before gate and an after gate. The run stops
//! at the first rejected gate, failed stage, or invalid state, and whatever
//! was added to the [`ErrorTree`] up to that point stays visible.
//!
//! ```rust
//! use legatus_core::chain::Chain;
//! use legatus_core::directive::{Directive, DirectiveSchema};
//! use legatus_core::storage::InMemoryStorage;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = DirectiveSchema::builder("create_note")
//!     .property("title", Chain::builder().step("fetch", [json!("title")]).then("strip").build()?)
//!     .build()?;
//!
//! let mut directive = Directive::new(schema.clone(), json!({"title": "  "}))?;
//! assert!(directive.execute(&InMemoryStorage::new()).is_err());
//! assert_eq!(directive.errors().to_value(), json!({"title": {"base": ["is required"]}}));
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod error_tree;
pub mod errors;
pub mod permit;
pub mod schema;
pub mod states;

pub use callbacks::{dispatch, gate, GateFn, Hook, HookOutcome, LoaderFn};
pub use error_tree::{ErrorKey, ErrorNode, ErrorTree};
pub use errors::{ExecutionError, ExecutionResult};
pub use permit::{permit, permit_with_suffix, PermitSchema};
pub use schema::{
    DirectiveSchema, DirectiveSchemaBuilder, DirectiveSettings, PropertySpec, StageCallbacks,
    TransactionHandler,
};
pub use states::{DirectiveState, Phase, Stage};

use crate::chain::{ChainError, ChainResult};
use crate::constants::{events, status_groups::LIFECYCLE_STAGES};
use crate::error::{LegatusError, Result};
use crate::logging::{log_error, log_stage_operation};
use crate::storage::{Loaded, Storage};
use crate::unit_of_work::UnitOfWork;
use crate::utils::is_blank;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Serializable view of a finished run, without raw input or bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveSnapshot {
    pub directive: String,
    pub run_id: Uuid,
    pub state: DirectiveState,
    pub properties: BTreeMap<String, Value>,
    pub models: BTreeMap<String, Value>,
}

/// One run of a directive against one raw input
pub struct Directive {
    schema: Arc<DirectiveSchema>,
    run_id: Uuid,
    raw_input: Value,
    props: BTreeMap<String, Value>,
    models: BTreeMap<String, Loaded>,
    errors: ErrorTree,
    state: DirectiveState,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directive")
            .field("name", &self.schema.name())
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("props", &self.props)
            .field("models", &self.models)
            .field("errors", &self.errors)
            .finish()
    }
}

impl Directive {
    /// Compute every declared property from `input`.
    ///
    /// Properties depend only on the raw input, never on each other. A chain
    /// that fails is reported with the property's name.
    pub fn new(schema: Arc<DirectiveSchema>, input: Value) -> ChainResult<Self> {
        let mut props = BTreeMap::new();
        for (name, spec) in schema.properties() {
            let value = spec
                .chain
                .apply(&input)
                .map_err(|e| ChainError::PropertyFailed {
                    property: name.clone(),
                    reason: e.to_string(),
                })?;
            props.insert(name.clone(), value);
        }

        let models = schema
            .model_slots()
            .map(|slot| (slot.to_string(), Loaded::None))
            .collect();

        let directive = Self {
            run_id: Uuid::new_v4(),
            raw_input: input,
            props,
            models,
            errors: ErrorTree::new(),
            state: DirectiveState::PropertiesComputed,
            created_at: Utc::now(),
            schema,
        };
        tracing::debug!(
            event = events::DIRECTIVE_INITIALIZED,
            directive = %directive.name(),
            run_id = %directive.run_id,
            properties = directive.props.len(),
            "directive initialized"
        );
        Ok(directive)
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<DirectiveSchema> {
        &self.schema
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> DirectiveState {
        self.state
    }

    pub fn raw_input(&self) -> &Value {
        &self.raw_input
    }

    pub fn props(&self) -> &BTreeMap<String, Value> {
        &self.props
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Values for `names`, looked up among properties and then model slots.
    /// Unknown names and empty slots yield null.
    pub fn extract(&self, names: &[&str]) -> Vec<Value> {
        names
            .iter()
            .map(|name| match self.props.get(*name) {
                Some(value) => value.clone(),
                None => self.models.get(*name).map_or(Value::Null, Loaded::to_value),
            })
            .collect()
    }

    pub fn model(&self, name: &str) -> Option<&Loaded> {
        self.models.get(name)
    }

    pub fn models(&self) -> &BTreeMap<String, Loaded> {
        &self.models
    }

    /// Fill a declared model slot
    pub fn set_model(&mut self, name: &str, loaded: impl Into<Loaded>) -> Result<()> {
        match self.models.get_mut(name) {
            Some(slot) => {
                *slot = loaded.into();
                Ok(())
            }
            None => Err(LegatusError::schema(format!(
                "{}: no model slot named {name}",
                self.schema.name()
            ))),
        }
    }

    pub fn errors(&self) -> &ErrorTree {
        &self.errors
    }

    /// Append `message` under `key`; hooks surface their own errors here
    pub fn add_error(&mut self, key: impl Into<ErrorKey>, message: impl Into<String>) {
        self.errors.add(key, message);
    }

    pub fn add_base_error(&mut self, message: impl Into<String>) {
        self.errors.add_base(message);
    }

    /// Deep-merge `other` under `key`
    pub fn merge_errors_at(&mut self, key: impl Into<ErrorKey>, other: ErrorTree) {
        self.errors.merge_at(key, other);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Filter `value` with this directive's nested-attributes suffix
    pub fn permit(&self, value: &Value, schema: &PermitSchema) -> Value {
        permit_with_suffix(value, schema, &self.schema.settings().nested_attributes_suffix)
    }

    pub fn snapshot(&self) -> DirectiveSnapshot {
        DirectiveSnapshot {
            directive: self.name().to_string(),
            run_id: self.run_id,
            state: self.state,
            properties: self.props.clone(),
            models: self
                .models
                .iter()
                .map(|(name, loaded)| (name.clone(), loaded.to_value()))
                .collect(),
        }
    }

    /// Run clean, load, validate and persist.
    ///
    /// `Ok(())` means every gate passed, the directive stayed valid, and the
    /// unit of work committed. On error the state is `Aborted` and the error
    /// names the stage that stopped the run.
    pub fn execute(&mut self, storage: &dyn Storage) -> ExecutionResult<()> {
        if self.state != DirectiveState::PropertiesComputed {
            return Err(ExecutionError::AlreadyExecuted { state: self.state });
        }

        let span = tracing::info_span!("directive", name = %self.name(), run_id = %self.run_id);
        let _entered = span.enter();

        let result = self.run_stages(storage);
        match &result {
            Ok(()) => tracing::info!(event = events::DIRECTIVE_COMPLETED, "directive persisted"),
            Err(e) => {
                self.state = DirectiveState::Aborted;
                tracing::warn!(
                    event = events::DIRECTIVE_ABORTED,
                    error = %e,
                    error_count = self.errors.message_count(),
                    "directive aborted"
                );
                if e.is_persistence_failure() {
                    log_error("unit_of_work", self.name(), &e.to_string(), Some(&self.run_id.to_string()));
                }
            }
        }
        result
    }

    fn run_stages(&mut self, storage: &dyn Storage) -> ExecutionResult<()> {
        if self.is_invalid() {
            return Err(self.invalid_at(Stage::Clean));
        }
        for stage in LIFECYCLE_STAGES {
            self.executed(*stage, storage)?;
        }
        Ok(())
    }

    /// Before gate, body, validity check, transition, after gate
    fn executed(&mut self, stage: Stage, storage: &dyn Storage) -> ExecutionResult<()> {
        tracing::debug!(event = events::DIRECTIVE_STAGE_STARTED, %stage, "stage started");
        self.run_gate(stage, Phase::Before)?;

        // clean always runs so that its own messages join any a hook added
        if stage != Stage::Clean && self.is_invalid() {
            return Err(self.invalid_at(stage));
        }
        match stage {
            Stage::Clean => self.clean(),
            Stage::Load => self.load()?,
            Stage::Validate => self.validate(),
            Stage::Persist => self.persist(storage)?,
        }
        // a blank required property leaves the abort to load, after its before gate
        if self.is_valid() {
            self.state = self
                .state
                .advance(stage)
                .ok_or(ExecutionError::InvalidTransition {
                    from: self.state,
                    stage,
                })?;
        } else if stage != Stage::Clean {
            return Err(self.invalid_at(stage));
        }

        self.run_gate(stage, Phase::After)?;
        tracing::debug!(event = events::DIRECTIVE_STAGE_COMPLETED, %stage, state = %self.state, "stage completed");
        log_stage_operation(self.name(), &self.run_id.to_string(), stage.as_str(), "completed", None);
        Ok(())
    }

    fn run_gate(&mut self, stage: Stage, phase: Phase) -> ExecutionResult<()> {
        let schema = Arc::clone(&self.schema);
        match gate(self, schema.callback(stage, phase)) {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(event = events::DIRECTIVE_GATE_REJECTED, %stage, %phase, "gate rejected");
                Err(ExecutionError::GateRejected {
                    directive: schema.name().to_string(),
                    stage,
                    phase,
                })
            }
            Err(e) => Err(ExecutionError::HookFailed {
                stage,
                phase,
                reason: e.to_string(),
            }),
        }
    }

    fn invalid_at(&self, stage: Stage) -> ExecutionError {
        ExecutionError::Invalid {
            directive: self.name().to_string(),
            stage,
        }
    }

    /// Flag every blank required property
    fn clean(&mut self) {
        let message = &self.schema.settings().required_message;
        for (name, spec) in self.schema.properties() {
            if spec.required && self.props.get(name).map_or(true, is_blank) {
                self.errors.add(name, message.as_str());
            }
        }
    }

    /// Dispatch loaders in declaration order. Only loader hooks fill slots.
    fn load(&mut self) -> ExecutionResult<()> {
        let schema = Arc::clone(&self.schema);
        for (name, hook) in schema.models() {
            let outcome = dispatch(self, Some(hook)).map_err(|e| ExecutionError::LoadFailed {
                model: name.clone(),
                reason: e.to_string(),
            })?;
            match outcome {
                HookOutcome::Loaded(loaded) => {
                    tracing::trace!(model = %name, records = loaded.records().len(), "model loaded");
                    self.models.insert(name.clone(), loaded);
                }
                // slot keeps whatever a hook placed with set_model
                HookOutcome::Passed(_) => tracing::trace!(model = %name, "no loader"),
            }
        }
        Ok(())
    }

    /// Check validation targets, then loader models not already checked
    fn validate(&mut self) {
        let schema = Arc::clone(&self.schema);
        let targets = schema
            .validations()
            .iter()
            .map(String::as_str)
            .chain(schema.models().iter().map(|(name, _)| name.as_str()));

        let mut checked = HashSet::new();
        for key in targets {
            if checked.insert(key) {
                self.check(key);
            }
        }
    }

    fn check(&mut self, key: &str) {
        match self.models.get(key) {
            Some(Loaded::One(record)) => {
                let record = record.lock();
                if record.is_invalid() {
                    self.errors.merge_at(key, record.validation_errors());
                }
            }
            Some(Loaded::Many(records)) => {
                for (index, record) in records.iter().enumerate() {
                    let record = record.lock();
                    if record.is_invalid() {
                        self.errors
                            .nested_mut(key)
                            .merge_at(index, record.validation_errors());
                    }
                }
            }
            Some(Loaded::None) | None => {}
        }
    }

    /// Run every transaction handler inside one unit of work
    fn persist(&mut self, storage: &dyn Storage) -> ExecutionResult<()> {
        let schema = Arc::clone(&self.schema);
        let this: &Directive = self;
        UnitOfWork::transaction(storage, schema.settings().unit_of_work_mode, |uow| {
            schema
                .transactions()
                .iter()
                .try_for_each(|handler| handler(&mut *uow, this))
        })?;
        Ok(())
    }
}
