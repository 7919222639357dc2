//! SQL utilities
//!
//! Cleanup of model output and the read-only guard applied before execution.

pub mod guard;
pub mod sanitize;

pub use guard::{StatementCheck, check};
pub use sanitize::sanitize_sql;
