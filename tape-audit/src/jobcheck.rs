//! Backup job coverage check.
//!
//! Confirms every live dataset is the target of some Bacula job by joining
//! the director's Job, Fileset and Client definitions and comparing the
//! result against the inventory.

use crate::bacula::resources::{config_files, directive};
use crate::inventory::InventorySource;
use crate::ledger::Dataset;
use crate::notify::Notifier;
use crate::remote::RemoteExec;
use crate::utils::{AuditError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A Bacula job resolved to the host and path it backs up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTarget {
    pub client: String,
    pub fileset: String,
    pub schedule: Option<String>,
    /// `File` of the job's fileset
    pub path: String,
    /// `Address` of the job's client
    pub address: String,
}

impl JobTarget {
    fn covers(&self, dataset: &Dataset) -> bool {
        same_host(&self.address, &dataset.server)
            && self.path.trim_end_matches('/') == dataset.path.trim_end_matches('/')
    }
}

fn same_host(a: &str, b: &str) -> bool {
    let short = |h: &str| h.split('.').next().unwrap_or(h).to_ascii_lowercase();
    a.eq_ignore_ascii_case(b) || short(a) == short(b)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        AuditError::Config(format!("reading {}: {e}", path.display()))
    })
}

fn required(content: &str, key: &str, file: &Path) -> Result<String> {
    directive(content, key).ok_or_else(|| {
        AuditError::Config(format!("{} has no {key} directive", file.display()))
    })
}

/// Map of resource `Name` to the value of `key` for every file in `dir`.
fn named_values(dir: &Path, key: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for file in config_files(dir)? {
        let content = read(&file)?;
        let name = required(&content, "Name", &file)?;
        if let Some(value) = directive(&content, key) {
            values.insert(name, value);
        }
    }
    Ok(values)
}

/// Resolve every job under `director_dir` to its client address and path.
pub fn load_job_targets(director_dir: &Path) -> Result<Vec<JobTarget>> {
    let filesets = named_values(&director_dir.join("Fileset"), "File")?;
    let clients = named_values(&director_dir.join("Client"), "Address")?;

    let mut targets = Vec::new();
    for file in config_files(&director_dir.join("Job"))? {
        let content = read(&file)?;
        let client = required(&content, "Client", &file)?;
        let fileset = required(&content, "Fileset", &file)?;

        let address = clients.get(&client).ok_or_else(|| {
            AuditError::Config(format!("{client} - Client definition doesn't exist"))
        })?;
        let path = filesets.get(&fileset).ok_or_else(|| {
            AuditError::Config(format!("{fileset} - Fileset definition doesn't exist"))
        })?;

        targets.push(JobTarget {
            schedule: directive(&content, "Schedule"),
            client,
            fileset,
            path: path.clone(),
            address: address.clone(),
        });
    }
    Ok(targets)
}

/// Datasets no job backs up.
pub fn uncovered(datasets: &[Dataset], jobs: &[JobTarget]) -> Vec<Dataset> {
    datasets
        .iter()
        .filter(|d| !jobs.iter().any(|j| j.covers(d)))
        .cloned()
        .collect()
}

/// Report every dataset without a backup job; returns the uncovered set.
pub fn check_jobs(
    inventory: &InventorySource,
    exec: &dyn RemoteExec,
    director_dir: &Path,
    notifier: &dyn Notifier,
) -> Result<Vec<Dataset>> {
    let jobs = load_job_targets(director_dir)?;
    tracing::info!(jobs = jobs.len(), dir = %director_dir.display(), "Loaded Bacula jobs");

    let datasets = inventory.datasets(exec)?;
    let missing = uncovered(&datasets, &jobs);

    for dataset in &missing {
        tracing::warn!(dataset = %dataset.path, server = %dataset.server, "No Bacula job found for dataset");
        notifier.notify(
            &format!("Check tape backups for {} on {}", dataset.path, dataset.server),
            &format!(
                "No Bacula job found for filesystem {} on {}. Please check this is correct",
                dataset.path, dataset.server
            ),
        );
    }

    tracing::info!(
        datasets = datasets.len(),
        uncovered = missing.len(),
        "Job coverage check completed"
    );
    Ok(missing)
}
