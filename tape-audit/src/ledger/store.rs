//! Ledger persistence.
//!
//! The on-disk form is headerless CSV, one `path,server,count` record per
//! line, so ledgers written by earlier spreadsheet-based tooling still load.

use super::{AuditLedger, DatasetRecord};
use crate::utils::{AuditError, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Result of reading a ledger from its store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
    /// The store held a ledger (possibly with no records)
    Found(AuditLedger),

    /// Nothing has been persisted yet; normal on a first run
    NotFound,
}

impl Loaded {
    pub fn into_ledger(self) -> AuditLedger {
        match self {
            Loaded::Found(ledger) => ledger,
            Loaded::NotFound => AuditLedger::new(),
        }
    }
}

/// Storage backend for the audit ledger
pub trait LedgerStore {
    fn load(&self) -> Result<Loaded>;

    /// Replace the persisted ledger with `ledger` in full.
    fn save(&self, ledger: &AuditLedger) -> Result<()>;
}

/// Ledger kept in a single line-oriented file
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Loaded> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::NotFound),
            Err(e) => return Err(AuditError::persistence(&self.path, e)),
        };

        let records = parse(reader_builder().from_reader(file))
            .map_err(|e| AuditError::persistence(&self.path, e))?;
        let ledger =
            AuditLedger::from_records(records).map_err(|e| AuditError::persistence(&self.path, e))?;
        Ok(Loaded::Found(ledger))
    }

    fn save(&self, ledger: &AuditLedger) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuditError::persistence(&self.path, e))?;
        }

        // Write beside the target and rename over it so a failed write never
        // leaves a truncated ledger behind.
        let tmp = self.temp_path();
        let write = || -> csv::Result<()> {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(File::create(&tmp)?);
            for record in ledger.records() {
                writer.serialize(record)?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AuditError::persistence(&self.path, e)
        })?;

        tracing::debug!(path = %self.path.display(), records = ledger.len(), "Ledger saved");
        Ok(())
    }
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(false);
    builder
}

fn parse<R: Read>(mut rdr: csv::Reader<R>) -> csv::Result<Vec<DatasetRecord>> {
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: DatasetRecord = result?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Dataset;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn as_set(ledger: &AuditLedger) -> HashSet<(String, String, u64)> {
        ledger
            .records()
            .iter()
            .map(|r| (r.path.clone(), r.server.clone(), r.checked_count))
            .collect()
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::new(dir.path().join("ledger.csv"));
        assert_eq!(store.load().unwrap(), Loaded::NotFound);
    }

    #[test]
    fn test_empty_file_is_found_and_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "").unwrap();

        let store = FileLedgerStore::new(&path);
        assert_eq!(store.load().unwrap(), Loaded::Found(AuditLedger::new()));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::new(dir.path().join("nested/ledger.csv"));
        let ledger = AuditLedger::from_records(vec![
            DatasetRecord::new("/tank/projects", "zfs1.example.org", 4),
            DatasetRecord::new("/tank/odd,name", "zfs2.example.org", 0),
            DatasetRecord::new("/tank/\"quoted\"", "zfs2.example.org", 12),
        ])
        .unwrap();

        store.save(&ledger).unwrap();
        let loaded = store.load().unwrap().into_ledger();

        assert_eq!(as_set(&loaded), as_set(&ledger));
    }

    #[test]
    fn test_save_overwrites_previous_content() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::new(dir.path().join("ledger.csv"));

        let mut ledger = AuditLedger::new();
        ledger.reconcile(&[Dataset::new("/a", "s1"), Dataset::new("/b", "s1")]);
        store.save(&ledger).unwrap();

        let smaller = AuditLedger::from_records(vec![DatasetRecord::new("/a", "s1", 1)]).unwrap();
        store.save(&smaller).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "/a,s1,1\n");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_reads_spreadsheet_line_endings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "/tank/a,srv1,2\r\n/tank/b,srv2,0\r\n").unwrap();

        let ledger = FileLedgerStore::new(&path).load().unwrap().into_ledger();
        assert_eq!(ledger.get("/tank/a", "srv1").unwrap().checked_count, 2);
        assert_eq!(ledger.get("/tank/b", "srv2").unwrap().checked_count, 0);
    }

    #[test]
    fn test_malformed_line_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "/tank/a,srv1,2\n/tank/b,srv2\n").unwrap();

        let err = FileLedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AuditError::Persistence { .. }));
    }

    #[test]
    fn test_bad_count_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "/tank/a,srv1,-1\n").unwrap();

        assert!(matches!(
            FileLedgerStore::new(&path).load(),
            Err(AuditError::Persistence { .. })
        ));
    }

    #[test]
    fn test_duplicate_rows_are_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "/tank/a,srv1,2\n/tank/a,srv1,5\n").unwrap();

        let err = FileLedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AuditError::Persistence { .. }));
        assert!(err.to_string().contains("duplicate record"));
    }

    #[test]
    fn test_quoted_fields_written_and_read() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::new(dir.path().join("ledger.csv"));
        let ledger = AuditLedger::from_records(vec![
            DatasetRecord::new("/tank/odd,name", "srv1", 3),
            DatasetRecord::new("/tank/say \"hi\"", "srv1", 1),
        ])
        .unwrap();

        store.save(&ledger).unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "\"/tank/odd,name\",srv1,3\n\"/tank/say \"\"hi\"\"\",srv1,1\n"
        );
        assert_eq!(store.load().unwrap().into_ledger(), ledger);
    }

    #[test]
    fn test_save_into_unwritable_location_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let store = FileLedgerStore::new(blocker.join("ledger.csv"));
        let ledger = AuditLedger::from_records(vec![DatasetRecord::new("/a", "s1", 0)]).unwrap();
        assert!(matches!(
            store.save(&ledger),
            Err(AuditError::Persistence { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_record_set(
            entries in prop::collection::hash_map(
                ("[a-z/,\" ]{1,16}", "[a-z0-9.]{1,12}"),
                0u64..1000,
                0..25,
            )
        ) {
            let dir = TempDir::new().unwrap();
            let store = FileLedgerStore::new(dir.path().join("ledger.csv"));
            let records = entries
                .iter()
                .map(|((p, s), c)| DatasetRecord::new(p.as_str(), s.as_str(), *c))
                .collect();
            let ledger = AuditLedger::from_records(records).unwrap();

            store.save(&ledger).unwrap();
            let loaded = store.load().unwrap().into_ledger();

            prop_assert_eq!(as_set(&loaded), as_set(&ledger));
        }
    }
}
