//! Configuration management for the tape audit.
//!
//! Loads configuration from a TOML file; every section falls back to its
//! defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audit: AuditConfig,
    pub fleet: FleetConfig,
    pub ssh: SshConfig,
    pub bacula: BaculaConfig,
    pub notify: NotifyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Ledger file holding per-dataset audit counts
    pub ledger_path: PathBuf,

    /// Local scratch directory restores are written into
    pub restore_dir: PathBuf,

    /// Files at or above this size (bytes) are never picked
    pub max_file_size: u64,

    /// Files modified more recently than this are never picked
    pub min_file_age_days: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// File servers whose ZFS datasets are backed up to tape
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Remote login user
    pub user: String,

    /// SSH port on every file server
    pub port: u16,

    /// Private key; the SSH agent is used when unset
    pub key_path: Option<PathBuf>,

    /// Session timeout in milliseconds (0 = block indefinitely)
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaculaConfig {
    /// bconsole binary
    pub bconsole: PathBuf,

    /// bacula-dir binary, used for `-t` configuration checks
    pub director: PathBuf,

    /// Director conf.d root; per-host `<host>-dir/` lives below it
    pub config_dir: PathBuf,

    /// Client that receives restores (defaults to `<local host>-fd`)
    pub restore_client: Option<String>,

    /// Scratch pool new pools recycle into
    pub scratch_pool: String,

    /// Tape autochanger storage resource
    pub autochanger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Recipients of alerts
    pub addresses: Vec<String>,

    /// sendmail-compatible binary
    pub sendmail: PathBuf,

    /// From header
    pub from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Directory for daily audit log files (stdout only when unset)
    pub dir: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("/var/lib/tape-audit/ledger.csv"),
            restore_dir: PathBuf::from("/tmp/restore"),
            max_file_size: 50 * 1024 * 1024, // 50 MiB
            min_file_age_days: 35,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            key_path: None,
            timeout_ms: 0,
        }
    }
}

impl Default for BaculaConfig {
    fn default() -> Self {
        Self {
            bconsole: PathBuf::from("/opt/bacula/bin/bconsole"),
            director: PathBuf::from("/opt/bacula/bin/bacula-dir"),
            config_dir: PathBuf::from("/opt/bacula/etc/conf.d/Director"),
            restore_client: None,
            scratch_pool: "Scratch".to_string(),
            autochanger: "QuantumLib1".to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            sendmail: PathBuf::from("/usr/sbin/sendmail"),
            from: "audit".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Per-host director configuration directory (`<config_dir>/<host>-dir`)
    pub fn director_dir(&self) -> PathBuf {
        self.bacula
            .config_dir
            .join(format!("{}-dir", local_short_hostname()))
    }

    /// Client name restores are sent to
    pub fn restore_client(&self) -> String {
        match &self.bacula.restore_client {
            Some(client) => client_name(client),
            None => client_name(&local_short_hostname()),
        }
    }
}

/// Bacula file daemon name for a host: short hostname plus `-fd`.
pub fn client_name(host: &str) -> String {
    if host.ends_with("-fd") {
        return host.to_string();
    }
    let short = host.split('.').next().unwrap_or(host);
    format!("{short}-fd")
}

pub fn local_short_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.split('.').next().unwrap_or_default().to_string())
        .unwrap_or_else(|| "localhost".to_string())
}
