//! Live dataset inventory.
//!
//! Lists ZFS mountpoints on every configured file server. The server list is
//! fixed at construction from configuration.

use crate::ledger::Dataset;
use crate::remote::RemoteExec;
use crate::utils::{AuditError, Result};

const ZFS_LIST_COMMAND: &str = "zfs list -H -o mountpoint";

/// Mountpoint values ZFS reports for datasets that are not mounted anywhere
const UNMOUNTED: &[&str] = &["none", "-", "legacy"];

#[derive(Debug, Clone)]
pub struct InventorySource {
    servers: Vec<String>,
}

impl InventorySource {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Collect datasets from every server.
    ///
    /// Fails on the first server that cannot be reached or reports no usable
    /// mountpoints; a broken server is never skipped silently.
    pub fn datasets(&self, exec: &dyn RemoteExec) -> Result<Vec<Dataset>> {
        if self.servers.is_empty() {
            return Err(AuditError::Config("no file servers configured".to_string()));
        }

        let mut datasets = Vec::new();
        for server in &self.servers {
            let output = exec.run(server, ZFS_LIST_COMMAND)?;
            let mountpoints = parse_mountpoints(server, &output)?;
            tracing::info!(server = %server, datasets = mountpoints.len(), "Inventory listed");
            datasets.extend(mountpoints.into_iter().map(|path| Dataset::new(path, server.as_str())));
        }
        Ok(datasets)
    }
}

fn parse_mountpoints(server: &str, output: &str) -> Result<Vec<String>> {
    let mut mountpoints = Vec::new();
    for line in output.lines().map(str::trim) {
        if line.is_empty() || UNMOUNTED.contains(&line) {
            continue;
        }
        if !line.starts_with('/') {
            return Err(AuditError::Inventory {
                server: server.to_string(),
                reason: format!("unexpected mountpoint '{line}' in zfs output"),
            });
        }
        mountpoints.push(line.to_string());
    }

    if mountpoints.is_empty() {
        return Err(AuditError::Inventory {
            server: server.to_string(),
            reason: "ZFS list returned no mounted datasets".to_string(),
        });
    }
    Ok(mountpoints)
}
