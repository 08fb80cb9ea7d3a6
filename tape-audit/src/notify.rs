//! Alert delivery.
//!
//! Notification is best-effort: a failure to deliver is logged and never
//! changes the outcome of the run that raised it.

use crate::config::NotifyConfig;
use std::io::Write;
use std::process::{Command, Stdio};

pub trait Notifier {
    fn notify(&self, subject: &str, body: &str);
}

/// Subject used for every fatal-error alert
pub fn error_subject() -> String {
    format!(
        "ERROR WITH AUDIT {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    )
}

pub const MISMATCH_SUBJECT: &str = "Checksum failed";

/// Sends mail through a local sendmail-compatible binary
pub struct MailNotifier {
    config: NotifyConfig,
}

impl MailNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    fn send(&self, subject: &str, body: &str) -> std::io::Result<()> {
        let mut child = Command::new(&self.config.sendmail)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(render_message(&self.config, subject, body).as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Notifier for MailNotifier {
    fn notify(&self, subject: &str, body: &str) {
        if self.config.addresses.is_empty() {
            tracing::warn!(subject, "No notification addresses configured, alert not sent");
            return;
        }
        match self.send(subject, body) {
            Ok(()) => tracing::debug!(subject, "Notification sent"),
            Err(e) => tracing::warn!(subject, error = %e, "Failed to send notification"),
        }
    }
}

fn render_message(config: &NotifyConfig, subject: &str, body: &str) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
        config.from,
        config.addresses.join(", "),
        subject.replace(['\r', '\n'], " "),
        body
    )
}
