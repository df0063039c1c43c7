//! Shared fixtures for integration tests.
#![allow(dead_code)]

pub mod builders;
pub mod strategies;

use legatus_core::config::LoggingConfig;
use legatus_core::logging::init_structured_logging;

/// Route test logs through the crate's subscriber once per binary
pub fn init_test_logging() {
    init_structured_logging(&LoggingConfig::default(), "test");
}
