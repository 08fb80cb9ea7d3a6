//! Monthly snapshot discovery and audit file selection.
//!
//! All filesystem inspection happens on the owning server. The chosen file is
//! mapped back onto the dataset afterwards because Bacula catalogues files
//! under their live path.

use crate::checksum;
use crate::ledger::DatasetRecord;
use crate::remote::{quote, RemoteExec};
use crate::utils::{AuditError, Result};
use std::path::{Path, PathBuf};

/// Limits on which files may be audited
#[derive(Debug, Clone, Copy)]
pub struct FileCriteria {
    /// Exclusive upper bound on file size in bytes
    pub max_size: u64,

    /// Minimum age of the last modification, in whole days
    pub min_age_days: u32,
}

impl Default for FileCriteria {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024,
            min_age_days: 35,
        }
    }
}

fn snapshot_error(dataset: &DatasetRecord, reason: impl Into<String>) -> AuditError {
    AuditError::Snapshot {
        dataset: dataset.path.clone(),
        server: dataset.server.clone(),
        reason: reason.into(),
    }
}

/// Most recently modified monthly snapshot directory of `dataset`.
///
/// Ordering comes from the snapshot directories' mtimes on the server, not
/// from the timestamp embedded in their names.
pub fn latest_monthly(exec: &dyn RemoteExec, dataset: &DatasetRecord) -> Result<String> {
    let command = format!(
        "ls -td -- {}/.zfs/snapshot/*monthly* 2>/dev/null | head -n 1",
        quote(dataset.path.trim_end_matches('/'))
    );
    let output = exec.run(&dataset.server, &command)?;
    let snapshot = output.trim();
    if snapshot.is_empty() {
        return Err(snapshot_error(dataset, "no monthly snapshot found"));
    }
    Ok(snapshot.to_string())
}

pub fn pick_command(snapshot: &str, criteria: FileCriteria) -> String {
    let mut command = format!(
        "find {} -type f -size -{}c",
        quote(snapshot),
        criteria.max_size
    );
    // find rounds ages down to whole days, so "+N" means at least N+1 days
    if criteria.min_age_days > 0 {
        command.push_str(&format!(" -mtime +{}", criteria.min_age_days - 1));
    }
    command.push_str(" 2>/dev/null | shuf -n 1");
    command
}

/// One uniformly random eligible file inside `snapshot`.
pub fn pick_file(
    exec: &dyn RemoteExec,
    dataset: &DatasetRecord,
    snapshot: &str,
    criteria: FileCriteria,
) -> Result<String> {
    let output = exec.run(&dataset.server, &pick_command(snapshot, criteria))?;
    let file = output.trim();
    if file.is_empty() {
        return Err(snapshot_error(
            dataset,
            format!("no eligible file in {snapshot}"),
        ));
    }
    Ok(file.to_string())
}

/// SHA-1 of `file` as stored on the dataset's server.
pub fn remote_sha1(exec: &dyn RemoteExec, dataset: &DatasetRecord, file: &str) -> Result<String> {
    let output = exec.run(&dataset.server, &format!("sha1sum -- {}", quote(file)))?;
    checksum::parse_sha1sum(&output)
        .ok_or_else(|| snapshot_error(dataset, format!("unexpected sha1sum output: {}", output.trim())))
}

/// Path Bacula knows `snapshot_file` by: its place inside `snapshot`,
/// rooted at the dataset mountpoint.
pub fn live_path(dataset: &DatasetRecord, snapshot: &str, snapshot_file: &str) -> Result<String> {
    let relative = snapshot_file
        .strip_prefix(snapshot.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| {
            snapshot_error(dataset, format!("{snapshot_file} is not inside {snapshot}"))
        })?;
    Ok(format!("{}/{relative}", dataset.path.trim_end_matches('/')))
}

/// Where a restore with `strip_prefix = dataset` and `add_prefix = restore_dir`
/// places `live_file`.
pub fn restored_path(restore_dir: &Path, dataset: &str, live_file: &str) -> PathBuf {
    let relative = live_file
        .strip_prefix(dataset.trim_end_matches('/'))
        .unwrap_or(live_file)
        .trim_start_matches('/');
    restore_dir.join(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedExec {
        reply: String,
        seen: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedExec {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl RemoteExec for ScriptedExec {
        fn run(&self, server: &str, command: &str) -> Result<String> {
            self.seen
                .borrow_mut()
                .push((server.to_string(), command.to_string()));
            Ok(self.reply.clone())
        }
    }

    fn dataset() -> DatasetRecord {
        DatasetRecord::new("/pool/data", "zfs1.example.org", 0)
    }

    #[test]
    fn test_live_path_drops_snapshot_directory() {
        let live = live_path(
            &dataset(),
            "/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly",
            "/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly/sub/file.txt",
        )
        .unwrap();
        assert_eq!(live, "/pool/data/sub/file.txt");
    }

    #[test]
    fn test_live_path_with_suffixed_label() {
        let snapshot = "/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly-keep";
        let live = live_path(&dataset(), snapshot, &format!("{snapshot}/sub/file.txt")).unwrap();
        assert_eq!(live, "/pool/data/sub/file.txt");
    }

    #[test]
    fn test_live_path_with_unstructured_label() {
        let snapshot = "/pool/data/.zfs/snapshot/autosnap_2024-03-01_monthly";
        let live = live_path(&dataset(), snapshot, &format!("{snapshot}/a b/c")).unwrap();
        assert_eq!(live, "/pool/data/a b/c");
    }

    #[test]
    fn test_file_outside_snapshot_is_snapshot_error() {
        let snapshot = "/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly";
        for file in [
            "/pool/data/sub/file.txt".to_string(),
            format!("{snapshot}-keep/file.txt"),
            format!("{snapshot}/"),
        ] {
            assert!(
                matches!(live_path(&dataset(), snapshot, &file), Err(AuditError::Snapshot { .. })),
                "{file} accepted"
            );
        }
    }

    #[test]
    fn test_latest_monthly_runs_on_owning_server() {
        let exec = ScriptedExec::new("/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly\n");
        let snapshot = latest_monthly(&exec, &dataset()).unwrap();

        assert_eq!(snapshot, "/pool/data/.zfs/snapshot/zback:2024-03-01-0200:monthly");
        let seen = exec.seen.borrow();
        assert_eq!(seen[0].0, "zfs1.example.org");
        assert!(seen[0].1.starts_with("ls -td -- /pool/data/.zfs/snapshot/*monthly*"));
    }

    #[test]
    fn test_no_monthly_snapshot_is_fatal() {
        let exec = ScriptedExec::new("\n");
        assert!(matches!(
            latest_monthly(&exec, &dataset()),
            Err(AuditError::Snapshot { .. })
        ));
    }

    #[test]
    fn test_pick_command_filters_size_and_age() {
        let command = pick_command("/pool/data/.zfs/snapshot/x:monthly", FileCriteria::default());
        assert!(command.contains("-type f"));
        assert!(command.contains("-size -52428800c"));
        assert!(command.contains("-mtime +34"));
        assert!(command.ends_with("| shuf -n 1"));
    }

    #[test]
    fn test_pick_command_quotes_snapshot_path() {
        let command = pick_command("/tank/my data/.zfs/snapshot/s:monthly", FileCriteria::default());
        assert!(command.starts_with("find '/tank/my data/.zfs/snapshot/s:monthly' "));
    }

    #[test]
    fn test_no_eligible_file_is_fatal() {
        let exec = ScriptedExec::new("");
        let result = pick_file(&exec, &dataset(), "/pool/data/.zfs/snapshot/s", FileCriteria::default());
        assert!(matches!(result, Err(AuditError::Snapshot { .. })));
    }

    #[test]
    fn test_remote_sha1_parses_digest() {
        let exec = ScriptedExec::new("da39a3ee5e6b4b0d3255bfef95601890afd80709  /pool/data/f\n");
        let digest = remote_sha1(&exec, &dataset(), "/pool/data/f").unwrap();
        assert_eq!(digest, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_restored_path_mirrors_strip_and_add_prefix() {
        let restored = restored_path(Path::new("/tmp/restore"), "/pool/data", "/pool/data/sub/file.txt");
        assert_eq!(restored, PathBuf::from("/tmp/restore/sub/file.txt"));
    }
}
