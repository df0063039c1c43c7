//! # System Constants
//!
//! Core constants that define the operational vocabulary of the directive
//! engine: lifecycle event names, error-tree keys, and default messages.

// Re-export state types for convenience
pub use crate::directive::{DirectiveState as DirectiveStatus, Phase, Stage};

/// Lifecycle events emitted to the tracing layer as directives progress
pub mod events {
    // Directive lifecycle events
    pub const DIRECTIVE_INITIALIZED: &str = "directive.initialized";
    pub const DIRECTIVE_STAGE_STARTED: &str = "directive.stage_started";
    pub const DIRECTIVE_STAGE_COMPLETED: &str = "directive.stage_completed";
    pub const DIRECTIVE_GATE_REJECTED: &str = "directive.gate_rejected";
    pub const DIRECTIVE_COMPLETED: &str = "directive.completed";
    pub const DIRECTIVE_ABORTED: &str = "directive.aborted";

    // Unit of work events
    pub const UNIT_OF_WORK_COMMITTED: &str = "unit_of_work.committed";
    pub const UNIT_OF_WORK_ROLLED_BACK: &str = "unit_of_work.rolled_back";
}

/// Keys and messages used when building error trees
pub mod messages {
    /// Key under which leaf messages for a field are stored
    pub const BASE_KEY: &str = "base";

    /// Message recorded by `clean` for a blank property
    pub const REQUIRED: &str = "is required";

    /// Suffix marking permitted nested-association input
    pub const NESTED_ATTRIBUTES_SUFFIX: &str = "_attributes";
}

/// System-wide identifiers and limits
pub mod system {
    /// Version string reported by tooling
    pub const LEGATUS_CORE_VERSION: &str = "0.1.0";

    /// Default configuration file stem
    pub const CONFIG_FILE_STEM: &str = "legatus";

    /// Prefix for configuration environment variables
    pub const ENV_PREFIX: &str = "LEGATUS";

    /// Guards runaway nesting in `permit`
    pub const MAX_PERMIT_DEPTH: usize = 16;
}

/// Stage ordering used by `Directive::execute`
pub mod status_groups {
    use super::{DirectiveStatus, Stage};

    /// Stages in the order they run
    pub const LIFECYCLE_STAGES: &[Stage] = &[Stage::Clean, Stage::Load, Stage::Validate, Stage::Persist];

    /// States from which no further transition is possible
    pub const TERMINAL_STATES: &[DirectiveStatus] =
        &[DirectiveStatus::Persisted, DirectiveStatus::Aborted];
}
