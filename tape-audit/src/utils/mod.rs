//! Utility modules for the tape audit.

pub mod errors;
pub mod logger;

pub use errors::{AuditError, Result};
