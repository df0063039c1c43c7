//! Hook specifications and their dispatch against a directive.
//!
//! A [`Hook`] is either absent, a boolean gate, or a loader that resolves a
//! related record or collection. [`dispatch`] treats an absent hook as a
//! passing gate, so directives only declare the hooks they need.

use super::Directive;
use crate::storage::Loaded;
use std::fmt;
use std::sync::Arc;

/// Predicate run before or after a lifecycle stage
pub type GateFn = Arc<dyn Fn(&mut Directive) -> bool + Send + Sync>;

/// Resolver run during `load`; errors abort the stage
pub type LoaderFn = Arc<dyn Fn(&mut Directive) -> crate::Result<Loaded> + Send + Sync>;

/// A hook specification
#[derive(Clone, Default)]
pub enum Hook {
    #[default]
    None,
    Gate(GateFn),
    Loader(LoaderFn),
}

impl Hook {
    pub fn gate<F>(f: F) -> Self
    where
        F: Fn(&mut Directive) -> bool + Send + Sync + 'static,
    {
        Self::Gate(Arc::new(f))
    }

    pub fn loader<F>(f: F) -> Self
    where
        F: Fn(&mut Directive) -> crate::Result<Loaded> + Send + Sync + 'static,
    {
        Self::Loader(Arc::new(f))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gate(_) => "gate",
            Self::Loader(_) => "loader",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook::{}", self.kind())
    }
}

/// Result of dispatching a hook
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Passed(bool),
    Loaded(Loaded),
}

impl HookOutcome {
    /// Gate reading of the outcome: a loader passes when it resolved something
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Passed(passed) => *passed,
            Self::Loaded(loaded) => !loaded.is_none(),
        }
    }

    /// Loader reading of the outcome: a gate resolves nothing
    pub fn into_loaded(self) -> Loaded {
        match self {
            Self::Loaded(loaded) => loaded,
            Self::Passed(_) => Loaded::None,
        }
    }
}

/// Invoke `hook` against `ctx`. An absent hook passes.
pub fn dispatch(ctx: &mut Directive, hook: Option<&Hook>) -> crate::Result<HookOutcome> {
    match hook {
        None | Some(Hook::None) => Ok(HookOutcome::Passed(true)),
        Some(Hook::Gate(f)) => Ok(HookOutcome::Passed(f(ctx))),
        Some(Hook::Loader(f)) => f(ctx).map(HookOutcome::Loaded),
    }
}

/// Dispatch `hook` as a gate
pub fn gate(ctx: &mut Directive, hook: Option<&Hook>) -> crate::Result<bool> {
    dispatch(ctx, hook).map(|outcome| outcome.is_truthy())
}
