//! Director resource files (`Job`, `Fileset`, `Pool`, `JobDefs`, `Client`).
//!
//! Rendering covers the definitions this tool provisions for a dataset;
//! reading extracts just enough of existing definitions to tell which
//! datasets already have a backup job.

use crate::config::client_name;
use crate::utils::{AuditError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_JOBDEFS: &str = "Default_Tape_JD";

/// Retention for a pool, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub job: u64,
    pub volume: u64,
}

/// Full backups: jobs kept 7 months, tapes recycled after 8
pub const FULL_RETENTION: Retention = Retention {
    job: 18_144_000,
    volume: 20_736_000,
};

/// Differentials: jobs kept 5 months, tapes recycled after 6
pub const DIFF_RETENTION: Retention = Retention {
    job: 12_960_000,
    volume: 15_552_000,
};

/// Everything needed to define tape backups for one dataset
#[derive(Debug, Clone)]
pub struct TapeJob {
    /// File server hostname
    pub server: String,
    /// ZFS set name, used to derive every resource name
    pub set_name: String,
    /// Dataset mountpoint to back up
    pub path: String,
    /// Existing schedule; the job never runs automatically when unset
    pub schedule: Option<String>,
    pub snapshot: bool,
    pub autochanger: String,
    pub scratch_pool: String,
}

impl TapeJob {
    pub fn fileset_name(&self) -> String {
        format!("zbkp_{}_fs", self.set_name)
    }

    pub fn job_name(&self) -> String {
        format!("zbkp_{}_job", self.set_name)
    }

    pub fn pool_name(&self, level: &str) -> String {
        format!("{}_pool_{level}", self.set_name)
    }
}

/// A rendered resource and where it belongs under the director directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub relative_path: PathBuf,
    pub content: String,
}

pub fn render_pool(job: &TapeJob, level: &str, retention: Retention) -> ResourceFile {
    let name = job.pool_name(level);
    let content = format!(
        r#"Pool {{
  Name = "{name}"
  Description = "{set} Tape {level} Pool"
  Catalog = "BaculaCatalog"
  CleaningPrefix = "CLN"
  JobRetention = {job_retention}
  PoolType = "Backup"
  RecyclePool = "{scratch}"
  ScratchPool = "{scratch}"
  Storage = "{storage}"
  VolumeRetention = {volume_retention}
}}
"#,
        set = job.set_name,
        job_retention = retention.job,
        scratch = job.scratch_pool,
        storage = job.autochanger,
        volume_retention = retention.volume,
    );
    ResourceFile {
        relative_path: PathBuf::from("Pool").join(format!("{}_{level}_pool.cfg", job.set_name)),
        content,
    }
}

pub fn render_jobdefs(job: &TapeJob) -> ResourceFile {
    let content = format!(
        r#"JobDefs {{
  Name = "{DEFAULT_JOBDEFS}"
  Description = "Default Tape Job Def"
  Type = "Backup"
  AllowDuplicateJobs = no
  AllowMixedPriority = yes
  CancelLowerLevelDuplicates = yes
  CancelQueuedDuplicates = no
  Messages = "Default"
  Storage = "{storage}"
  WriteBootstrap = "/opt/bacula/bsr/%c_%n.bsr"
}}
"#,
        storage = job.autochanger,
    );
    ResourceFile {
        relative_path: PathBuf::from("JobDefs").join(format!("{DEFAULT_JOBDEFS}.cfg")),
        content,
    }
}

pub fn render_fileset(job: &TapeJob) -> ResourceFile {
    let snapshot = if job.snapshot {
        "  EnableSnapshot = yes\n"
    } else {
        ""
    };
    let content = format!(
        r#"Fileset {{
  Name = "{name}"
  Description = "{server} - {set} Backup Fileset"
{snapshot}  EnableVss = no
  Include {{
   Options {{
    AclSupport = yes
    Signature = Sha256
    XattrSupport = yes
   }}
   File = "{path}"
  }}
}}
"#,
        name = job.fileset_name(),
        server = job.server,
        set = job.set_name,
        path = job.path,
    );
    ResourceFile {
        relative_path: PathBuf::from("Fileset").join(format!("{}.cfg", job.fileset_name())),
        content,
    }
}

pub fn render_job(job: &TapeJob) -> ResourceFile {
    let schedule = match &job.schedule {
        Some(s) => format!("  Schedule = \"{s}\"\n"),
        None => String::new(),
    };
    let content = format!(
        r#"Job {{
  Name = "{name}"
  Description = "{server} - {set} Backup Job"
  Client = "{client}"
  DifferentialBackupPool = "{diff_pool}"
  Fileset = "{fileset}"
  FullBackupPool = "{full_pool}"
{schedule}  JobDefs = "{DEFAULT_JOBDEFS}"
  Pool = "{full_pool}"
}}
"#,
        name = job.job_name(),
        server = job.server,
        set = job.set_name,
        client = client_name(&job.server),
        diff_pool = job.pool_name("diff"),
        fileset = job.fileset_name(),
        full_pool = job.pool_name("full"),
    );
    ResourceFile {
        relative_path: PathBuf::from("Job").join(format!("{}.cfg", job.job_name())),
        content,
    }
}

/// Value of the first `Key = "value"` directive named `key` (case-insensitive).
pub fn directive(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let v = v.trim();
        let v = v.strip_prefix('"').and_then(|s| s.split('"').next()).unwrap_or(v);
        Some(v.to_string())
    })
}

/// `*.cfg` files directly inside `dir`; a missing directory holds none.
pub fn config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| AuditError::Io(e.into()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "cfg") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
