//! Parsing of bconsole transcripts.
//!
//! bconsole only speaks free text; everything the audit needs from it is
//! extracted here and nowhere else.

use regex::Regex;
use std::sync::LazyLock;

static QUEUED_JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"JobId=(\d+)").expect("valid regex"));

static REPORT_JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*JobId:\s+(\d+)").expect("valid regex"));

/// Job id printed when a job is queued (`Job queued. JobId=1234`).
pub fn queued_job_id(transcript: &str) -> Option<String> {
    QUEUED_JOB_ID
        .captures(transcript)
        .map(|c| c[1].to_string())
}

/// Terminal status from the job report of `job_id`.
///
/// Reports for other jobs may be interleaved in the message queue; only a
/// `Termination:` line inside the report whose `JobId:` matches is taken.
pub fn termination_status(transcript: &str, job_id: &str) -> Option<String> {
    let mut current_job: Option<&str> = None;
    for line in transcript.lines() {
        if let Some(caps) = REPORT_JOB_ID.captures(line) {
            current_job = caps.get(1).map(|m| m.as_str());
            continue;
        }
        let Some((_, status)) = line.split_once("Termination:") else {
            continue;
        };
        if current_job == Some(job_id) {
            return Some(status.trim().to_string());
        }
    }
    None
}

/// Whether a `reload` was refused because jobs are running.
pub fn reload_ignored(transcript: &str) -> bool {
    transcript.contains("Request ignored")
}

/// Whether the director rejected the configuration on reload.
pub fn reload_rejected(transcript: &str) -> bool {
    transcript.contains("Please correct")
}

/// Job lines from `.status dir running`.
pub fn running_jobs(transcript: &str) -> Vec<String> {
    transcript
        .lines()
        .filter(|line| line.contains("is running"))
        .map(|line| line.trim().to_string())
        .collect()
}
