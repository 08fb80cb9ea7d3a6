//! Verify pipeline - one restore audit per run.
//!
//! Stages run strictly in order and never loop back:
//!
//! ```text
//! Inventory → Reconcile → Select → ResolveSnapshot → PickFile → HashRemote
//!   → PersistSelectionCommit → Restore → HashLocal → Compare → Cleanup → Done
//! ```
//!
//! A failure in any stage up to and including HashLocal is logged, notified
//! once, and ends the run. A checksum mismatch in Compare is a finding, not a
//! failure, and Cleanup problems only raise a warning.
//!
//! The ledger count for the chosen dataset is persisted before the restore is
//! submitted, so a concurrently scheduled run is unlikely to pick the same
//! dataset while a long restore is in flight. Nothing locks the ledger;
//! keeping runs from overlapping is left to the scheduler.

use crate::bacula::{BackupControl, RestoreRequest};
use crate::checksum;
use crate::config::client_name;
use crate::inventory::InventorySource;
use crate::ledger::{self, AuditLedger, Dataset, DatasetRecord, LedgerStore, Loaded};
use crate::notify::{self, Notifier};
use crate::remote::RemoteExec;
use crate::snapshot::{self, FileCriteria};
use crate::utils::AuditError;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Inventory,
    Reconcile,
    Select,
    ResolveSnapshot,
    PickFile,
    HashRemote,
    PersistSelectionCommit,
    Restore,
    HashLocal,
    Compare,
    Cleanup,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Inventory => "inventory",
            Stage::Reconcile => "reconcile",
            Stage::Select => "select",
            Stage::ResolveSnapshot => "resolve-snapshot",
            Stage::PickFile => "pick-file",
            Stage::HashRemote => "hash-remote",
            Stage::PersistSelectionCommit => "persist-selection",
            Stage::Restore => "restore",
            Stage::HashLocal => "hash-local",
            Stage::Compare => "compare",
            Stage::Cleanup => "cleanup",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A run that ended before reaching Compare
#[derive(Debug, thiserror::Error)]
#[error("audit aborted at {stage}: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    pub dataset: Option<Dataset>,
    pub source: AuditError,
}

/// Result of a run that reached Done
#[derive(Debug, Clone, Serialize)]
pub struct AuditOutcome {
    /// Chosen record as it was before this run's increment
    pub dataset: DatasetRecord,
    pub snapshot: String,
    pub snapshot_file: String,
    pub live_file: String,
    pub restored_file: PathBuf,
    pub restore_job_id: String,
    pub remote_checksum: String,
    pub local_checksum: String,
    pub matched: bool,
    pub cleanup_warning: Option<String>,
}

/// Run-independent pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Scratch directory restores land in
    pub restore_dir: PathBuf,

    /// Bacula client receiving the restore
    pub restore_client: String,

    pub criteria: FileCriteria,
}

pub struct VerifyPipeline<'a> {
    inventory: &'a InventorySource,
    store: &'a dyn LedgerStore,
    exec: &'a dyn RemoteExec,
    control: &'a dyn BackupControl,
    notifier: &'a dyn Notifier,
    settings: PipelineSettings,
}

impl<'a> VerifyPipeline<'a> {
    pub fn new(
        inventory: &'a InventorySource,
        store: &'a dyn LedgerStore,
        exec: &'a dyn RemoteExec,
        control: &'a dyn BackupControl,
        notifier: &'a dyn Notifier,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inventory,
            store,
            exec,
            control,
            notifier,
            settings,
        }
    }

    /// Log and notify a fatal stage failure, then hand it back for propagation.
    fn fail(&self, stage: Stage, dataset: Option<&DatasetRecord>, source: AuditError) -> StageFailure {
        let (path, server) = dataset
            .map(|d| (d.path.as_str(), d.server.as_str()))
            .unwrap_or(("-", "-"));
        error!(stage = %stage, dataset = %path, server = %server, error = %source, "Audit stage failed");

        let body = format!(
            "Audit aborted at stage: {stage}\nDataset: {path}\nServer: {server}\n\n{source}"
        );
        self.notifier.notify(&notify::error_subject(), &body);

        StageFailure {
            stage,
            dataset: dataset.map(DatasetRecord::dataset),
            source,
        }
    }

    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<AuditOutcome, StageFailure> {
        info!("Starting audit run");

        // Inventory
        let live = self
            .inventory
            .datasets(self.exec)
            .map_err(|e| self.fail(Stage::Inventory, None, e))?;

        // Reconcile
        let ledger = self
            .reconcile(&live)
            .map_err(|e| self.fail(Stage::Reconcile, None, e))?;

        // Select
        let chosen = ledger::select(&ledger, rng)
            .map_err(|e| self.fail(Stage::Select, None, e))?
            .clone();
        info!(
            dataset = %chosen.path,
            server = %chosen.server,
            checked = chosen.checked_count,
            "Dataset selected for audit"
        );

        // ResolveSnapshot
        let snapshot = snapshot::latest_monthly(self.exec, &chosen)
            .map_err(|e| self.fail(Stage::ResolveSnapshot, Some(&chosen), e))?;
        info!(dataset = %chosen.path, server = %chosen.server, snapshot = %snapshot, "Snapshot chosen");

        // PickFile
        let (snapshot_file, live_file) =
            snapshot::pick_file(self.exec, &chosen, &snapshot, self.settings.criteria)
                .and_then(|file| {
                    let live = snapshot::live_path(&chosen, &snapshot, &file)?;
                    Ok((file, live))
                })
                .map_err(|e| self.fail(Stage::PickFile, Some(&chosen), e))?;

        // HashRemote
        let remote_checksum = snapshot::remote_sha1(self.exec, &chosen, &snapshot_file)
            .map_err(|e| self.fail(Stage::HashRemote, Some(&chosen), e))?;
        info!(file = %snapshot_file, checksum = %remote_checksum, "Remote checksum computed");

        // PersistSelectionCommit
        let restored_file =
            snapshot::restored_path(&self.settings.restore_dir, &chosen.path, &live_file);
        self.commit(&ledger, &chosen)
            .map_err(|e| self.fail(Stage::PersistSelectionCommit, Some(&chosen), e))?;

        // Restore
        let restore_job_id = self
            .restore(&chosen, &live_file, &restored_file)
            .map_err(|e| self.fail(Stage::Restore, Some(&chosen), e))?;
        info!(file = %restored_file.display(), job_id = %restore_job_id, "Restored file");

        // HashLocal
        let local_checksum = checksum::sha1_file(&restored_file)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AuditError::LocalFileMissing(restored_file.clone()),
                _ => AuditError::Io(e),
            })
            .map_err(|e| self.fail(Stage::HashLocal, Some(&chosen), e))?;
        info!(checksum = %local_checksum, "Restored file checksum computed");

        // Compare
        let matched = local_checksum == remote_checksum;
        if matched {
            info!(dataset = %chosen.path, server = %chosen.server, "Checksums match");
        } else {
            error!(
                stage = %Stage::Compare,
                dataset = %chosen.path,
                server = %chosen.server,
                file = %live_file,
                remote = %remote_checksum,
                local = %local_checksum,
                "Checksums do not match"
            );
            self.notifier.notify(
                notify::MISMATCH_SUBJECT,
                &format!(
                    "Failed check for: {} on {}\nFile: {}\nSnapshot: {}\nRestore job: {}\n\
                     Remote checksum: {}\nLocal checksum:  {}",
                    chosen.path,
                    chosen.server,
                    live_file,
                    snapshot,
                    restore_job_id,
                    remote_checksum,
                    local_checksum
                ),
            );
        }

        // Cleanup
        let cleanup_warning = self.cleanup(&restored_file);

        info!(stage = %Stage::Done, matched, "Audit completed successfully");
        Ok(AuditOutcome {
            dataset: chosen,
            snapshot,
            snapshot_file,
            live_file,
            restored_file,
            restore_job_id,
            remote_checksum,
            local_checksum,
            matched,
            cleanup_warning,
        })
    }

    /// Load the ledger, add unseen datasets, and persist only when it changed.
    fn reconcile(&self, live: &[Dataset]) -> Result<AuditLedger, AuditError> {
        let loaded = self.store.load()?;
        let existed = matches!(loaded, Loaded::Found(_));
        if !existed {
            warn!("Audit ledger does not exist, creating it");
        }

        let mut ledger = loaded.into_ledger();
        let added = ledger.reconcile(live);
        for dataset in &added {
            info!(dataset = %dataset.path, server = %dataset.server, "Dataset not in ledger, adding it");
        }

        if !existed || !added.is_empty() {
            self.store.save(&ledger)?;
        }
        Ok(ledger)
    }

    fn commit(&self, ledger: &AuditLedger, chosen: &DatasetRecord) -> Result<(), AuditError> {
        let committed = ledger.increment(chosen)?;
        self.store.save(&committed)?;
        info!(
            dataset = %chosen.path,
            server = %chosen.server,
            checked = chosen.checked_count + 1,
            "Selection committed to ledger"
        );
        Ok(())
    }

    fn restore(&self, chosen: &DatasetRecord, live_file: &str, restored_file: &Path) -> Result<String, AuditError> {
        std::fs::create_dir_all(&self.settings.restore_dir)?;

        // A copy left by an interrupted run must not be mistaken for this restore
        if restored_file.exists() {
            warn!(file = %restored_file.display(), "Removing stale restored file");
            std::fs::remove_file(restored_file)?;
        }

        let request = RestoreRequest {
            source_client: client_name(&chosen.server),
            restore_client: self.settings.restore_client.clone(),
            file: live_file.to_string(),
            strip_prefix: chosen.path.clone(),
            add_prefix: self.settings.restore_dir.to_string_lossy().into_owned(),
        };
        let outcome = self.control.submit_restore(&request)?;
        if !outcome.is_ok() {
            return Err(AuditError::Restore {
                job_id: outcome.job_id,
                status: outcome.status,
            });
        }
        Ok(outcome.job_id)
    }

    fn cleanup(&self, restored_file: &Path) -> Option<String> {
        match std::fs::remove_file(restored_file) {
            Ok(()) => None,
            Err(e) => {
                warn!(stage = %Stage::Cleanup, file = %restored_file.display(), error = %e, "Can't remove restored file");
                self.notifier.notify(
                    &notify::error_subject(),
                    &format!("Error deleting {}\n{e}", restored_file.display()),
                );
                Some(e.to_string())
            }
        }
    }
}
