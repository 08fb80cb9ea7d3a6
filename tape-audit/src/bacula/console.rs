//! `bconsole` and `bacula-dir` process wrappers.

use super::transcript;
use super::{BackupControl, DirectorService, RestoreOutcome, RestoreRequest};
use crate::config::BaculaConfig;
use crate::utils::{AuditError, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

const DIRECTOR_SERVICE: &str = "bacula-dir";

pub struct Bconsole {
    bconsole: PathBuf,
    director: PathBuf,
}

impl Bconsole {
    pub fn new(config: &BaculaConfig) -> Self {
        Self {
            bconsole: config.bconsole.clone(),
            director: config.director.clone(),
        }
    }

    /// Feed `commands` to a fresh bconsole session and return its stdout.
    fn console(&self, commands: &str) -> Result<String> {
        let mut child = Command::new(&self.bconsole)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AuditError::Console(format!("failed to start {}: {e}", self.bconsole.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(commands.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(AuditError::Console(format!(
                "bconsole exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(stdout)
    }
}

fn run_checked(command: &mut Command) -> Result<String> {
    let output = command.output().map_err(|e| {
        AuditError::Console(format!("failed to run {:?}: {e}", command.get_program()))
    })?;
    if !output.status.success() {
        return Err(AuditError::Console(format!(
            "{:?} exited with {}: {}",
            command.get_program(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn with_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Console line for `request`.
///
/// Paths are double-quoted on the line and bconsole has no escape for a quote
/// inside them, so values that would break out of their field are refused.
pub fn restore_command(request: &RestoreRequest) -> Result<String> {
    let quoted = [
        ("file", &request.file),
        ("strip_prefix", &request.strip_prefix),
        ("add_prefix", &request.add_prefix),
    ];
    for (name, value) in quoted {
        if value.contains(['"', '\n', '\r']) {
            return Err(AuditError::Console(format!(
                "{name} cannot be passed to bconsole: {value:?}"
            )));
        }
    }
    for client in [&request.source_client, &request.restore_client] {
        if client.is_empty() || client.contains(char::is_whitespace) || client.contains('"') {
            return Err(AuditError::Console(format!(
                "invalid client name for bconsole: {client:?}"
            )));
        }
    }

    Ok(format!(
        "restore client={} restoreclient={} file=\"{}\" strip_prefix=\"{}\" add_prefix=\"{}\" current done yes\n",
        request.source_client,
        request.restore_client,
        request.file,
        with_slash(&request.strip_prefix),
        with_slash(&request.add_prefix),
    ))
}

impl BackupControl for Bconsole {
    fn submit_restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome> {
        let command = restore_command(request)?;

        // Drain queued messages so the report read later belongs to this run
        self.console(".messages\n")?;

        let submitted = self.console(&command)?;
        let job_id = transcript::queued_job_id(&submitted).ok_or_else(|| {
            AuditError::Console(format!(
                "no JobId in restore transcript: {}",
                submitted.trim()
            ))
        })?;
        tracing::info!(job_id = %job_id, file = %request.file, "Restore job queued");

        let report = self.console(&format!("wait jobid={job_id}\n.messages\n"))?;
        let status = transcript::termination_status(&report, &job_id).ok_or_else(|| {
            AuditError::Console(format!("no termination status for JobId {job_id}"))
        })?;

        Ok(RestoreOutcome { status, job_id })
    }

    fn check_config(&self) -> Result<()> {
        run_checked(
            Command::new(&self.director).args(["-u", "bacula", "-g", "bacula", "-t"]),
        )?;
        Ok(())
    }

    fn reload(&self) -> Result<bool> {
        let out = self.console("reload\n")?;
        if transcript::reload_rejected(&out) {
            return Err(AuditError::Console(
                "director rejected configuration on reload".to_string(),
            ));
        }
        Ok(!transcript::reload_ignored(&out))
    }
}

impl DirectorService for Bconsole {
    fn running_jobs(&self) -> Result<Vec<String>> {
        let out = self.console(".status dir running\n")?;
        Ok(transcript::running_jobs(&out))
    }

    fn restart(&self) -> Result<()> {
        run_checked(Command::new("systemctl").args(["restart", DIRECTOR_SERVICE]))?;

        // systemctl can return success while the unit fails to come up
        let state = Command::new("systemctl")
            .args(["is-active", DIRECTOR_SERVICE])
            .output()?;
        let state = String::from_utf8_lossy(&state.stdout).trim().to_string();
        if state != "active" {
            return Err(AuditError::Console(format!(
                "{DIRECTOR_SERVICE} is '{state}' after restart"
            )));
        }
        tracing::info!("Bacula director restarted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(file: &str) -> RestoreRequest {
        RestoreRequest {
            source_client: "zfs1-fd".into(),
            restore_client: "backup1-fd".into(),
            file: file.into(),
            strip_prefix: "/pool/data".into(),
            add_prefix: "/tmp/restore".into(),
        }
    }

    #[test]
    fn test_restore_command_layout() {
        assert_eq!(
            restore_command(&request("/pool/data/sub/file.txt")).unwrap(),
            "restore client=zfs1-fd restoreclient=backup1-fd file=\"/pool/data/sub/file.txt\" \
             strip_prefix=\"/pool/data/\" add_prefix=\"/tmp/restore/\" current done yes\n"
        );
    }

    #[test]
    fn test_restore_command_refuses_field_breakouts() {
        for file in [
            "/pool/data/say \"hi\".txt",
            "/pool/data/two\nlines",
            "/pool/data/cr\rhere",
        ] {
            assert!(
                matches!(restore_command(&request(file)), Err(AuditError::Console(_))),
                "{file:?} accepted"
            );
        }

        let mut bad_prefix = request("/pool/data/f");
        bad_prefix.add_prefix = "/tmp/\"x".into();
        assert!(restore_command(&bad_prefix).is_err());

        let mut bad_client = request("/pool/data/f");
        bad_client.source_client = "zfs1-fd yes".into();
        assert!(restore_command(&bad_client).is_err());
    }

    #[test]
    fn test_unsafe_file_rejected_before_bconsole_runs() {
        // A missing bconsole would fail differently if it were spawned
        let console = Bconsole::new(&BaculaConfig {
            bconsole: PathBuf::from("/nonexistent/bconsole"),
            ..BaculaConfig::default()
        });
        let err = console
            .submit_restore(&request("/pool/data/say \"hi\".txt"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot be passed to bconsole"));
    }

    #[test]
    fn test_missing_bconsole_is_console_error() {
        let console = Bconsole::new(&BaculaConfig {
            bconsole: PathBuf::from("/nonexistent/bconsole"),
            ..BaculaConfig::default()
        });
        assert!(matches!(
            console.reload(),
            Err(AuditError::Console(_))
        ));
    }
}
