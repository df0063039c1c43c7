use serde::{Deserialize, Serialize};
use std::fmt;

/// Directive lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveState {
    /// Instance allocated, properties not yet computed
    #[default]
    Init,
    /// Every declared property chain has been evaluated
    PropertiesComputed,
    /// Required properties checked
    Cleaned,
    /// Model loaders dispatched
    Loaded,
    /// Validation targets checked
    Validated,
    /// Unit of work committed
    Persisted,
    /// A gate, validity check, or persistence step stopped the run
    Aborted,
}

impl DirectiveState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        crate::constants::status_groups::TERMINAL_STATES.contains(self)
    }

    /// Check if the run finished successfully
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Persisted)
    }

    /// State reached when `stage` completes from this state, if legal
    pub fn advance(&self, stage: Stage) -> Option<DirectiveState> {
        match (self, stage) {
            (Self::PropertiesComputed, Stage::Clean) => Some(Self::Cleaned),
            (Self::Cleaned, Stage::Load) => Some(Self::Loaded),
            (Self::Loaded, Stage::Validate) => Some(Self::Validated),
            (Self::Validated, Stage::Persist) => Some(Self::Persisted),
            _ => None,
        }
    }
}

impl fmt::Display for DirectiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::PropertiesComputed => write!(f, "properties_computed"),
            Self::Cleaned => write!(f, "cleaned"),
            Self::Loaded => write!(f, "loaded"),
            Self::Validated => write!(f, "validated"),
            Self::Persisted => write!(f, "persisted"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for DirectiveState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "properties_computed" => Ok(Self::PropertiesComputed),
            "cleaned" => Ok(Self::Cleaned),
            "loaded" => Ok(Self::Loaded),
            "validated" => Ok(Self::Validated),
            "persisted" => Ok(Self::Persisted),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid directive state: {s}")),
        }
    }
}

/// Lifecycle stages, run strictly in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Clean,
    Load,
    Validate,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Self::Clean),
            "load" => Ok(Self::Load),
            "validate" => Ok(Self::Validate),
            "persist" => Ok(Self::Persist),
            _ => Err(format!("Invalid directive stage: {s}")),
        }
    }
}

/// Position of a callback relative to its stage body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}
