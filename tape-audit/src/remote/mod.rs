//! Remote command execution on file servers.

pub mod ssh;

use crate::utils::Result;
use std::borrow::Cow;

pub use ssh::SshExecutor;

/// Runs a shell command line on a named host and returns its stdout.
///
/// Implementations fail with [`crate::AuditError::RemoteExecution`] on
/// connection problems or a non-zero exit status.
pub trait RemoteExec {
    fn run(&self, server: &str, command: &str) -> Result<String>;
}

/// Quote a single argument for a POSIX shell on the remote side.
pub fn quote(arg: &str) -> Cow<'_, str> {
    shell_words::quote(arg)
}
