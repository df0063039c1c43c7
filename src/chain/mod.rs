//! # Property Chains
//!
//! A [`Chain`] derives one property value from raw request input by threading
//! a rolling value through an ordered list of named operations. Evaluation
//! stops as soon as an intermediate result is null, so a chain never turns a
//! missing upstream value into something else.
//!
//! Operations are resolved through an [`OperationRegistry`] when the chain is
//! built, so an unknown name is a schema error rather than a request-time
//! failure.
//!
//! ```rust
//! use legatus_core::chain::Chain;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let code = Chain::builder()
//!     .step("fetch", [json!("order")])
//!     .step("fetch", [json!("code")])
//!     .then("strip")
//!     .then("upcase")
//!     .build()?;
//!
//! let input = json!({"order": {"code": "  ab-12 "}});
//! assert_eq!(code.apply(&input)?, json!("AB-12"));
//! assert_eq!(code.apply(&json!({}))?, serde_json::Value::Null);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod operations;

pub use errors::{ChainError, ChainResult};
pub use operations::OperationRegistry;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Signature shared by every chain operation
pub type OperationFn = Arc<dyn Fn(Value, &Arguments) -> ChainResult<Value> + Send + Sync>;

/// Arguments carried by a single chain step
#[derive(Debug, Clone)]
pub enum Arguments {
    /// Positional arguments passed to the operation
    Positional(Vec<Value>),
    /// A sub-chain the operation applies per element
    Callback(Chain),
}

impl Arguments {
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Positional arguments, empty when the step carries a callback
    pub fn positional(&self) -> &[Value] {
        match self {
            Self::Positional(args) => args,
            Self::Callback(_) => &[],
        }
    }

    pub fn callback(&self) -> Option<&Chain> {
        match self {
            Self::Callback(chain) => Some(chain),
            Self::Positional(_) => None,
        }
    }
}

/// One resolved step of a chain
#[derive(Clone)]
pub struct Step {
    name: String,
    operation: OperationFn,
    arguments: Arguments,
}

impl Step {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    fn invoke(&self, value: Value) -> ChainResult<Value> {
        (self.operation)(value, &self.arguments)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// An ordered, immutable sequence of operations
#[derive(Debug, Clone)]
pub struct Chain {
    steps: Arc<[Step]>,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            steps: Arc::from(Vec::new()),
        }
    }
}

impl Chain {
    /// Start building a chain against the built-in operations
    pub fn builder() -> ChainBuilder<'static> {
        ChainBuilder::new(OperationRegistry::builtins())
    }

    /// Start building a chain against a custom registry
    pub fn builder_with(registry: &OperationRegistry) -> ChainBuilder<'_> {
        ChainBuilder::new(registry)
    }

    /// A chain with no steps; `apply` returns its input unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluate the chain against `source`.
    ///
    /// Each step receives the previous step's result. A null result ends
    /// evaluation immediately; later steps are never invoked.
    pub fn apply(&self, source: &Value) -> ChainResult<Value> {
        self.apply_owned(source.clone())
    }

    /// Same as [`Chain::apply`] but takes ownership of the source value
    pub fn apply_owned(&self, source: Value) -> ChainResult<Value> {
        let mut result = source;
        for step in self.steps.iter() {
            if result.is_null() {
                tracing::trace!(operation = step.name(), "chain short-circuited on null");
                return Ok(Value::Null);
            }
            result = step.invoke(result)?;
        }
        Ok(result)
    }
}

/// Fluent builder that resolves operation names as steps are added
pub struct ChainBuilder<'r> {
    registry: &'r OperationRegistry,
    steps: Vec<Step>,
    error: Option<ChainError>,
}

impl<'r> ChainBuilder<'r> {
    pub fn new(registry: &'r OperationRegistry) -> Self {
        Self {
            registry,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Append an operation with positional arguments
    pub fn step<I>(self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.push(name, Arguments::Positional(args.into_iter().collect()))
    }

    /// Append an operation that takes no arguments
    pub fn then(self, name: &str) -> Self {
        self.push(name, Arguments::none())
    }

    /// Append an operation that forwards a per-element sub-chain
    pub fn step_with(self, name: &str, callback: Chain) -> Self {
        self.push(name, Arguments::Callback(callback))
    }

    fn push(mut self, name: &str, arguments: Arguments) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.registry.resolve(name) {
            Ok(operation) => self.steps.push(Step {
                name: name.to_string(),
                operation,
                arguments,
            }),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Finish the chain, reporting the first unresolved operation
    pub fn build(self) -> ChainResult<Chain> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Chain {
                steps: self.steps.into(),
            }),
        }
    }
}
