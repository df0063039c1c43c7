//! Shared helpers used across the chain, directive, and unit-of-work modules.

pub mod value;

pub use value::{is_blank, is_scalar, is_truthy, type_name};
