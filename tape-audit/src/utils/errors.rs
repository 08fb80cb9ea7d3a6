//! Custom error types for the tape audit.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inventory error on {server}: {reason}")]
    Inventory { server: String, reason: String },

    #[error("Remote execution failed on {server} (`{command}`): {reason}")]
    RemoteExecution {
        server: String,
        command: String,
        reason: String,
    },

    #[error("Snapshot error for {dataset} on {server}: {reason}")]
    Snapshot {
        dataset: String,
        server: String,
        reason: String,
    },

    #[error("Restore error: job {job_id} finished with status '{status}'")]
    Restore { job_id: String, status: String },

    #[error("Backup console error: {0}")]
    Console(String),

    #[error("Restored file not found: {}", .0.display())]
    LocalFileMissing(PathBuf),

    #[error("Ledger persistence error ({}): {reason}", .path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Duplicate ledger record for {path} on {server}")]
    DuplicateRecord { path: String, server: String },

    #[error("Audit ledger is empty, nothing to select")]
    EmptyLedger,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AuditError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn remote(server: &str, command: &str, reason: impl ToString) -> Self {
        AuditError::RemoteExecution {
            server: server.to_string(),
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
