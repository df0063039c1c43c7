use super::states::{DirectiveState, Phase, Stage};
use crate::unit_of_work::PersistenceError;
use thiserror::Error;

/// Reasons a directive run stopped before persisting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Directive {directive} is invalid at {stage}")]
    Invalid { directive: String, stage: Stage },

    #[error("{phase} {stage} callback rejected directive {directive}")]
    GateRejected {
        directive: String,
        stage: Stage,
        phase: Phase,
    },

    #[error("{phase} {stage} callback failed: {reason}")]
    HookFailed {
        stage: Stage,
        phase: Phase,
        reason: String,
    },

    #[error("Loader for model {model} failed: {reason}")]
    LoadFailed { model: String, reason: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid lifecycle transition from {from} via {stage}")]
    InvalidTransition { from: DirectiveState, stage: Stage },

    #[error("Directive already executed (state: {state})")]
    AlreadyExecuted { state: DirectiveState },
}

impl ExecutionError {
    /// Stage at which the run stopped, when one applies
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Invalid { stage, .. }
            | Self::GateRejected { stage, .. }
            | Self::HookFailed { stage, .. }
            | Self::InvalidTransition { stage, .. } => Some(*stage),
            Self::LoadFailed { .. } => Some(Stage::Load),
            Self::Persistence(_) => Some(Stage::Persist),
            Self::AlreadyExecuted { .. } => None,
        }
    }

    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
