//! Bacula director control.
//!
//! The rest of the crate talks to Bacula only through [`BackupControl`];
//! console transcripts never leave this module.

pub mod console;
pub mod resources;
pub mod transcript;

use crate::utils::Result;
use serde::Serialize;

pub use console::Bconsole;

/// Terminal status Bacula reports for a successful restore
pub const RESTORE_OK: &str = "Restore OK";

/// A single-file restore job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreRequest {
    /// File daemon the backup was taken from (`<host>-fd`)
    pub source_client: String,

    /// File daemon the file is restored to
    pub restore_client: String,

    /// File as catalogued by Bacula (live path)
    pub file: String,

    /// Leading path removed before writing
    pub strip_prefix: String,

    /// Directory prepended after stripping
    pub add_prefix: String,
}

/// Structured result of a finished restore job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    pub status: String,
    pub job_id: String,
}

impl RestoreOutcome {
    pub fn is_ok(&self) -> bool {
        self.status == RESTORE_OK
    }
}

pub trait BackupControl {
    /// Submit a restore, wait for it to finish, and report its terminal status.
    fn submit_restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome>;

    /// Validate the director configuration on disk.
    fn check_config(&self) -> Result<()>;

    /// Ask the running director to reload its configuration.
    ///
    /// Returns `false` when the director declined because jobs are running.
    fn reload(&self) -> Result<bool>;
}

/// Director process management beyond the console protocol
pub trait DirectorService {
    /// Jobs currently running on the director.
    fn running_jobs(&self) -> Result<Vec<String>>;

    /// Restart the director and confirm it is active again.
    fn restart(&self) -> Result<()>;
}
