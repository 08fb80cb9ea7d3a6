//! Tape Audit Library
//!
//! Restore-based integrity auditing for Bacula tape backups of ZFS datasets,
//! spreading audits evenly across the fleet.

pub mod bacula;
pub mod checksum;
pub mod config;
pub mod inventory;
pub mod jobcheck;
pub mod ledger;
pub mod notify;
pub mod pipeline;
pub mod provision;
pub mod remote;
pub mod snapshot;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::AuditError;
pub type Result<T> = std::result::Result<T, AuditError>;
