//! Tape job provisioning for a dataset.
//!
//! Writes Pool, JobDefs, Fileset and Job resources into the director
//! directory, checking the configuration before starting and after each
//! group of writes, then reloads and, when idle, restarts the director.

use crate::bacula::resources::{
    render_fileset, render_job, render_jobdefs, render_pool, ResourceFile, TapeJob,
    DIFF_RETENTION, FULL_RETENTION,
};
use crate::bacula::{BackupControl, DirectorService};
use crate::utils::{AuditError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Schedules that exist on the director
pub const SCHEDULES: &[&str] = &["First", "Second", "Third"];

/// What happened to the running director after the new files were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartState {
    Restarted,
    /// Jobs were running; restart manually once they finish
    SkippedJobsRunning(usize),
    /// systemctl failed; the director must be checked by hand
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub written: Vec<PathBuf>,
    /// `false` when the director ignored the reload
    pub reloaded: bool,
    pub restart: RestartState,
}

/// Every resource the job needs, in the order they are written.
///
/// The default JobDefs is only included when `director_dir` lacks one; an
/// existing definition is assumed correct.
pub fn render_all(job: &TapeJob, director_dir: &Path) -> Vec<ResourceFile> {
    let mut files = vec![
        render_pool(job, "full", FULL_RETENTION),
        render_pool(job, "diff", DIFF_RETENTION),
    ];
    let jobdefs = render_jobdefs(job);
    if !director_dir.join(&jobdefs.relative_path).exists() {
        files.push(jobdefs);
    }
    files.push(render_fileset(job));
    files.push(render_job(job));
    files
}

fn check<C: BackupControl + ?Sized>(control: &C, after: &str) -> Result<()> {
    control.check_config().map_err(|e| {
        AuditError::Console(format!("configuration check failed ({after}): {e}"))
    })
}

fn write_resource(director_dir: &Path, file: &ResourceFile) -> Result<PathBuf> {
    let path = director_dir.join(&file.relative_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, &file.content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640))?;
    }

    info!(path = %path.display(), "Wrote Bacula resource");
    Ok(path)
}

pub fn provision<D>(job: &TapeJob, director_dir: &Path, director: &D) -> Result<ProvisionReport>
where
    D: BackupControl + DirectorService + ?Sized,
{
    if let Some(schedule) = &job.schedule {
        if !SCHEDULES.contains(&schedule.as_str()) {
            return Err(AuditError::Config(format!(
                "unknown schedule '{schedule}', expected one of {}",
                SCHEDULES.join(", ")
            )));
        }
    }

    check(director, "start, no action taken")?;

    let mut written = Vec::new();
    for file in render_all(job, director_dir) {
        written.push(write_resource(director_dir, &file)?);
        let kind = file
            .relative_path
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        check(director, &format!("created {kind} file"))?;
    }

    let reloaded = director.reload()?;
    if !reloaded {
        warn!("Director refused to reload; new resources are not loaded yet");
    }

    let restart = match director.running_jobs()? {
        jobs if !jobs.is_empty() => {
            warn!(running = jobs.len(), "Jobs are running, director not restarted");
            RestartState::SkippedJobsRunning(jobs.len())
        }
        _ => match director.restart() {
            Ok(()) => RestartState::Restarted,
            Err(e) => {
                warn!(error = %e, "Director restart failed, check it manually");
                RestartState::Failed(e.to_string())
            }
        },
    };

    Ok(ProvisionReport {
        written,
        reloaded,
        restart,
    })
}
