//! Immutable directive schemas.
//!
//! A schema is assembled once with [`DirectiveSchemaBuilder`] and shared as
//! `Arc<DirectiveSchema>` by every instance of the directive. Nothing on it
//! can change after `build`.

use super::callbacks::Hook;
use super::states::{Phase, Stage};
use super::Directive;
use crate::chain::Chain;
use crate::constants::messages::{NESTED_ATTRIBUTES_SUFFIX, REQUIRED};
use crate::error::{LegatusError, Result};
use crate::unit_of_work::{PersistResult, UnitOfWork, UnitOfWorkMode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Persistence step run inside the directive's unit of work
pub type TransactionHandler =
    Arc<dyn Fn(&mut UnitOfWork<'_>, &Directive) -> PersistResult<()> + Send + Sync>;

/// Per-directive tunables, usually taken from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveSettings {
    /// Message recorded by `clean` for a blank required property
    pub required_message: String,
    /// Suffix appended to nested association keys by `permit`
    pub nested_attributes_suffix: String,
    pub unit_of_work_mode: UnitOfWorkMode,
}

impl Default for DirectiveSettings {
    fn default() -> Self {
        Self {
            required_message: REQUIRED.to_string(),
            nested_attributes_suffix: NESTED_ATTRIBUTES_SUFFIX.to_string(),
            unit_of_work_mode: UnitOfWorkMode::default(),
        }
    }
}

/// A declared property
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub chain: Chain,
    /// Checked for blankness by `clean`
    pub required: bool,
}

/// Before/after hooks for one stage
#[derive(Debug, Clone, Default)]
pub struct StageCallbacks {
    pub before: Hook,
    pub after: Hook,
}

impl StageCallbacks {
    pub fn get(&self, phase: Phase) -> &Hook {
        match phase {
            Phase::Before => &self.before,
            Phase::After => &self.after,
        }
    }
}

pub struct DirectiveSchema {
    name: String,
    properties: Vec<(String, PropertySpec)>,
    models: Vec<(String, Hook)>,
    validations: Vec<String>,
    transactions: Vec<TransactionHandler>,
    callbacks: HashMap<Stage, StageCallbacks>,
    settings: DirectiveSettings,
}

impl fmt::Debug for DirectiveSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveSchema")
            .field("name", &self.name)
            .field("properties", &self.property_names().collect::<Vec<_>>())
            .field("models", &self.models.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("validations", &self.validations)
            .field("transactions", &self.transactions.len())
            .field("callbacks", &self.callbacks)
            .field("settings", &self.settings)
            .finish()
    }
}

impl DirectiveSchema {
    pub fn builder(name: impl Into<String>) -> DirectiveSchemaBuilder {
        DirectiveSchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[(String, PropertySpec)] {
        &self.properties
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }

    pub fn models(&self) -> &[(String, Hook)] {
        &self.models
    }

    pub fn validations(&self) -> &[String] {
        &self.validations
    }

    pub fn transactions(&self) -> &[TransactionHandler] {
        &self.transactions
    }

    pub fn settings(&self) -> &DirectiveSettings {
        &self.settings
    }

    /// Hook for `stage`/`phase`, `None` when nothing was declared
    pub fn callback(&self, stage: Stage, phase: Phase) -> Option<&Hook> {
        self.callbacks
            .get(&stage)
            .map(|callbacks| callbacks.get(phase))
            .filter(|hook| !hook.is_none())
    }

    /// Settable model slots: loaders first, then validation-only names
    pub fn model_slots(&self) -> impl Iterator<Item = &str> {
        let loaders = self.models.iter().map(|(name, _)| name.as_str());
        let extra = self
            .validations
            .iter()
            .filter(|name| !self.models.iter().any(|(m, _)| m == *name))
            .map(String::as_str);
        loaders.chain(extra)
    }

    pub fn has_model_slot(&self, name: &str) -> bool {
        self.models.iter().any(|(m, _)| m == name) || self.validations.iter().any(|v| v == name)
    }
}

/// Builder for [`DirectiveSchema`]
pub struct DirectiveSchemaBuilder {
    schema: DirectiveSchema,
}

impl DirectiveSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: DirectiveSchema {
                name: name.into(),
                properties: Vec::new(),
                models: Vec::new(),
                validations: Vec::new(),
                transactions: Vec::new(),
                callbacks: HashMap::new(),
                settings: DirectiveSettings::default(),
            },
        }
    }

    /// Declare a required property
    pub fn property(self, name: impl Into<String>, chain: Chain) -> Self {
        self.push_property(name.into(), chain, true)
    }

    /// Declare a property that `clean` never flags
    pub fn optional_property(self, name: impl Into<String>, chain: Chain) -> Self {
        self.push_property(name.into(), chain, false)
    }

    fn push_property(mut self, name: String, chain: Chain, required: bool) -> Self {
        self.schema
            .properties
            .push((name, PropertySpec { chain, required }));
        self
    }

    /// Declare a model slot filled by `hook` during `load`
    pub fn model(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.schema.models.push((name.into(), hook));
        self
    }

    /// Add validation targets, checked in the order given
    pub fn validate<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .validations
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn transaction<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut UnitOfWork<'_>, &Directive) -> PersistResult<()> + Send + Sync + 'static,
    {
        self.schema.transactions.push(Arc::new(handler));
        self
    }

    /// Attach a boolean gate to `stage`/`phase`
    pub fn callback<F>(self, stage: Stage, phase: Phase, gate: F) -> Self
    where
        F: Fn(&mut Directive) -> bool + Send + Sync + 'static,
    {
        self.callback_hook(stage, phase, Hook::gate(gate))
    }

    /// Attach any hook to `stage`/`phase`, replacing an earlier one
    pub fn callback_hook(mut self, stage: Stage, phase: Phase, hook: Hook) -> Self {
        let entry = self.schema.callbacks.entry(stage).or_default();
        match phase {
            Phase::Before => entry.before = hook,
            Phase::After => entry.after = hook,
        }
        self
    }

    pub fn settings(mut self, settings: DirectiveSettings) -> Self {
        self.schema.settings = settings;
        self
    }

    pub fn build(self) -> Result<Arc<DirectiveSchema>> {
        let schema = self.schema;
        let name = &schema.name;
        if name.trim().is_empty() {
            return Err(LegatusError::schema("directive name must not be blank"));
        }

        let mut properties = HashSet::new();
        for (property, _) in &schema.properties {
            if !properties.insert(property.as_str()) {
                return Err(LegatusError::schema(format!("{name}: duplicate property {property}")));
            }
        }

        let mut models = HashSet::new();
        for (model, _) in &schema.models {
            if !models.insert(model.as_str()) {
                return Err(LegatusError::schema(format!("{name}: duplicate model {model}")));
            }
            if properties.contains(model.as_str()) {
                return Err(LegatusError::schema(format!(
                    "{name}: model {model} shadows a property"
                )));
            }
        }

        let mut validations = HashSet::new();
        for target in &schema.validations {
            if !validations.insert(target.as_str()) {
                return Err(LegatusError::schema(format!(
                    "{name}: validation target {target} declared twice"
                )));
            }
            if properties.contains(target.as_str()) {
                return Err(LegatusError::schema(format!(
                    "{name}: validation target {target} is a property, not a model"
                )));
            }
        }

        tracing::debug!(
            directive = %name,
            properties = schema.properties.len(),
            models = schema.models.len(),
            validations = schema.validations.len(),
            transactions = schema.transactions.len(),
            "directive schema built"
        );
        Ok(Arc::new(schema))
    }
}
