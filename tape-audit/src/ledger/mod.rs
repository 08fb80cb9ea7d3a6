//! Audit ledger - per-dataset audit attempt counters.
//!
//! The ledger is the only fairness state the audit keeps. It is reconciled
//! against the live inventory on every run and mutated in exactly one place
//! ([`AuditLedger::increment`]) for the dataset a run has chosen.

pub mod select;
pub mod store;

use crate::utils::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use select::select;
pub use store::{FileLedgerStore, LedgerStore, Loaded};

/// A backed-up dataset as reported by the live inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    /// Mountpoint of the dataset on its server
    pub path: String,

    /// Owning file server
    pub server: String,
}

impl Dataset {
    pub fn new(path: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            server: server.into(),
        }
    }
}

/// One auditable unit and the number of audits attempted against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub path: String,
    pub server: String,
    pub checked_count: u64,
}

impl DatasetRecord {
    pub fn new(path: impl Into<String>, server: impl Into<String>, checked_count: u64) -> Self {
        Self {
            path: path.into(),
            server: server.into(),
            checked_count,
        }
    }

    pub fn dataset(&self) -> Dataset {
        Dataset::new(self.path.clone(), self.server.clone())
    }

    fn is(&self, path: &str, server: &str) -> bool {
        self.path == path && self.server == server
    }
}

/// Full set of dataset records for the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLedger {
    records: Vec<DatasetRecord>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from records, rejecting duplicate `(path, server)` pairs.
    pub fn from_records(records: Vec<DatasetRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert((record.path.as_str(), record.server.as_str())) {
                return Err(AuditError::DuplicateRecord {
                    path: record.path.clone(),
                    server: record.server.clone(),
                });
            }
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &str, server: &str) -> Option<&DatasetRecord> {
        self.records.iter().find(|r| r.is(path, server))
    }

    /// Append every live dataset that has no record yet, at count zero.
    ///
    /// Existing records are never touched. Returns the datasets that were
    /// added; an empty result means the ledger is unchanged.
    pub fn reconcile(&mut self, live: &[Dataset]) -> Vec<Dataset> {
        let mut added = Vec::new();
        for dataset in live {
            if self.get(&dataset.path, &dataset.server).is_some() {
                continue;
            }
            self.records
                .push(DatasetRecord::new(&dataset.path, &dataset.server, 0));
            added.push(dataset.clone());
        }
        added
    }

    /// Derive a ledger where only `chosen` has its count raised by one.
    pub fn increment(&self, chosen: &DatasetRecord) -> Result<AuditLedger> {
        let mut records = self.records.clone();
        let record = records
            .iter_mut()
            .find(|r| r.is(&chosen.path, &chosen.server))
            .ok_or_else(|| {
                AuditError::persistence(
                    "<ledger>",
                    format!("no record for {} on {}", chosen.path, chosen.server),
                )
            })?;
        record.checked_count += 1;
        Ok(AuditLedger { records })
    }
}
