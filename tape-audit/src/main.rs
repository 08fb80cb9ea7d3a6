//! Tape Audit - Main entry point
//!
//! Restores one file from tape per run and compares it with the snapshot it
//! was backed up from.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tape_audit::bacula::resources::TapeJob;
use tape_audit::bacula::Bconsole;
use tape_audit::config::Config;
use tape_audit::inventory::InventorySource;
use tape_audit::ledger::FileLedgerStore;
use tape_audit::notify::MailNotifier;
use tape_audit::pipeline::{PipelineSettings, VerifyPipeline};
use tape_audit::provision::{self, RestartState};
use tape_audit::remote::SshExecutor;
use tape_audit::snapshot::FileCriteria;
use tape_audit::{jobcheck, utils};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore one file from tape and verify its checksum
    Audit {
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report datasets that no Bacula job backs up
    CheckJobs,

    /// Create Bacula pool, fileset and job definitions for a dataset
    Provision {
        /// Server holding the dataset
        #[arg(long)]
        server: String,

        /// Dataset mountpoint
        #[arg(long)]
        path: String,

        /// Short name used in resource names
        #[arg(long)]
        set_name: String,

        /// Schedule (First, Second or Third)
        #[arg(long)]
        schedule: Option<String>,

        /// Back up the live filesystem instead of a snapshot
        #[arg(long)]
        snap_off: bool,

        /// Print the rendered files without writing them
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging; the guard flushes the log file on exit
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    let _log_guard = utils::logger::init(log_level, config.log.dir.as_deref())?;

    tracing::info!("Starting tape-audit v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Audit { json } => audit(&config, json),
        Command::CheckJobs => check_jobs(&config),
        Command::Provision {
            server,
            path,
            set_name,
            schedule,
            snap_off,
            dry_run,
        } => {
            let job = TapeJob {
                server,
                set_name,
                path,
                schedule,
                snapshot: !snap_off,
                autochanger: config.bacula.autochanger.clone(),
                scratch_pool: config.bacula.scratch_pool.clone(),
            };
            provision_job(&config, &job, dry_run)
        }
    }
}

fn audit(config: &Config, json: bool) -> Result<()> {
    let inventory = InventorySource::new(config.fleet.servers.clone());
    let store = FileLedgerStore::new(&config.audit.ledger_path);
    let exec = SshExecutor::new(config.ssh.clone());
    let console = Bconsole::new(&config.bacula);
    let notifier = MailNotifier::new(config.notify.clone());

    let settings = PipelineSettings {
        restore_dir: config.audit.restore_dir.clone(),
        restore_client: config.restore_client(),
        criteria: FileCriteria {
            max_size: config.audit.max_file_size,
            min_age_days: config.audit.min_file_age_days,
        },
    };

    let pipeline = VerifyPipeline::new(&inventory, &store, &exec, &console, &notifier, settings);
    let outcome = pipeline.run(&mut rand::rng())?;

    // A mismatch is a finding already notified by the pipeline, not a process error
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

fn check_jobs(config: &Config) -> Result<()> {
    let inventory = InventorySource::new(config.fleet.servers.clone());
    let exec = SshExecutor::new(config.ssh.clone());
    let notifier = MailNotifier::new(config.notify.clone());
    let director_dir = config.director_dir();

    let missing = jobcheck::check_jobs(&inventory, &exec, &director_dir, &notifier)
        .with_context(|| format!("checking jobs in {}", director_dir.display()))?;

    for dataset in &missing {
        println!("{}\t{}", dataset.server, dataset.path);
    }
    Ok(())
}

fn provision_job(config: &Config, job: &TapeJob, dry_run: bool) -> Result<()> {
    let director_dir = config.director_dir();

    if dry_run {
        for file in provision::render_all(job, &director_dir) {
            println!("# {}", director_dir.join(&file.relative_path).display());
            println!("{}", file.content);
        }
        return Ok(());
    }

    let console = Bconsole::new(&config.bacula);
    let report = provision::provision(job, &director_dir, &console)
        .with_context(|| format!("provisioning {} on {}", job.path, job.server))?;

    for path in &report.written {
        println!("created {}", path.display());
    }
    if !report.reloaded {
        println!("director did not reload; run 'reload' in bconsole once jobs finish");
    }
    match report.restart {
        RestartState::Restarted => println!("director restarted"),
        RestartState::SkippedJobsRunning(n) => {
            println!("{n} job(s) running, restart bacula-dir manually when they finish")
        }
        RestartState::Failed(reason) => {
            anyhow::bail!("bacula-dir restart failed, check it manually: {reason}")
        }
    }
    Ok(())
}
