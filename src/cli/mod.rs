//! Command-line interface for pagewright.
//!
//! Provides commands for deploying a submission, checking deployment
//! status, listing records, and inspecting configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::adapters::{
    DryRunProbe, DryRunProvider, GitHubProvider, HttpProbe, HttpTransport, Probe, Provider,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    identity, NotificationSender, Orchestrator, PublishPoller, RecordStore, RevisionPlanner,
};
use crate::domain::{DeploymentRecord, DeploymentState};
use crate::intake::{self, Submission};
use crate::site::StaticSite;

/// pagewright - publish task sites to GitHub Pages and report back
#[derive(Parser, Debug)]
#[command(name = "pagewright")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a submission and run its deployment to completion
    Deploy {
        /// Submission JSON file (reads from stdin if not provided)
        file: Option<PathBuf>,

        /// Fabricate repository and Pages URLs instead of calling GitHub
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the deployment record for a task
    Status {
        /// Task ID
        task_id: String,
    },

    /// List deployment records
    Records {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print the deployment key and repository name for a submission
    Key {
        /// Submission JSON file (reads from stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Check that the hosting provider is usable
    Check,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Deploy { file, dry_run } => deploy(file, dry_run).await,
            Commands::Status { task_id } => show_status(&task_id).await,
            Commands::Records { limit } => list_records(limit).await,
            Commands::Key { file } => show_key(file),
            Commands::Check => check_provider().await,
            Commands::Config => show_config(),
        }
    }
}

/// Read a submission from a file or piped stdin
fn read_submission(file: Option<PathBuf>) -> Result<Submission> {
    let content = if let Some(path) = file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read submission file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No submission provided. Pass a file or pipe JSON to stdin");
    };

    serde_json::from_str(&content).context("Invalid submission JSON")
}

fn build_provider(config: &ResolvedConfig, dry_run: bool) -> Result<Arc<dyn Provider>> {
    if dry_run {
        let owner = config.github_user.clone().unwrap_or_else(|| "dry-run".to_string());
        return Ok(Arc::new(DryRunProvider::new(owner)));
    }
    Ok(Arc::new(GitHubProvider::new(config.github_config()?)))
}

async fn build_orchestrator(config: &ResolvedConfig, dry_run: bool) -> Result<Arc<Orchestrator>> {
    let store = Arc::new(RecordStore::open(config.records_path()).await?);
    let provider = build_provider(config, dry_run)?;

    let probe: Arc<dyn Probe> = if dry_run {
        Arc::new(DryRunProbe)
    } else {
        Arc::new(HttpProbe::new(config.poll.check_timeout)?)
    };
    let transport = Arc::new(HttpTransport::new(config.request_timeout)?);

    let owner = config
        .author_name
        .clone()
        .or_else(|| config.github_user.clone())
        .unwrap_or_default();
    let renderer = Arc::new(StaticSite::new(owner, chrono::Utc::now().year()));

    Ok(Arc::new(Orchestrator::new(
        store,
        provider,
        RevisionPlanner::new(renderer),
        PublishPoller::new(probe, config.poll),
        NotificationSender::new(transport, config.backoff),
    )))
}

/// Validate, acknowledge, and run a deployment
async fn deploy(file: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = config::config()?;
    let submission = read_submission(file)?;

    let (task, ack) = intake::accept(submission, config.project_secret.as_deref())
        .context("Submission rejected")?;
    println!("{}", serde_json::to_string(&ack)?);

    let orchestrator = build_orchestrator(config, dry_run).await?;

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, abandoning in-flight deployment");
            cancel.cancel();
        }
    });

    let record = orchestrator
        .submit(task)
        .await
        .context("Deployment task panicked")??;

    print_record(&record);

    if record.state != DeploymentState::Done {
        std::process::exit(1);
    }
    Ok(())
}

/// Show the record for a task
async fn show_status(task_id: &str) -> Result<()> {
    let config = config::config()?;
    let store = RecordStore::open(config.records_path()).await?;

    let record = store
        .get(task_id)
        .await
        .with_context(|| format!("No deployment record for task '{}'", task_id))?;

    print_record(&record);
    Ok(())
}

/// List recent records
async fn list_records(limit: usize) -> Result<()> {
    let config = config::config()?;
    let store = RecordStore::open(config.records_path()).await?;
    let records = store.list().await;

    if records.is_empty() {
        println!("No deployments found.");
        return Ok(());
    }

    println!(
        "{:<32} {:<6} {:<11} {:<12} UPDATED",
        "TASK", "ROUND", "STATE", "COMMIT"
    );
    println!("{}", "-".repeat(84));

    for record in records.into_iter().take(limit) {
        let commit = record
            .last_commit_sha
            .as_deref()
            .map(short_sha)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<32} {:<6} {:<11} {:<12} {}",
            truncate(&record.task_id, 32),
            record.round,
            record.state.name(),
            commit,
            record.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// Print the derived identity for a submission
fn show_key(file: Option<PathBuf>) -> Result<()> {
    let submission = read_submission(file)?;
    let secret = submission.secret.clone();
    let (task, _) = intake::accept(submission, Some(secret.as_str())).context("Submission rejected")?;

    let key = identity::derive(&task);
    println!("Key: {}", key);
    println!("Repository: {}", identity::repository_name(&task.task_id, &key));
    Ok(())
}

async fn check_provider() -> Result<()> {
    let config = config::config()?;
    let provider = build_provider(config, false)?;
    provider.health_check().await?;
    println!("Provider '{}' is ready.", provider.name());
    Ok(())
}

fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home: {}", config.home.display());
    println!("Records: {}", config.records_path().display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none)"),
    }
    println!(
        "GitHub user: {}",
        config.github_user.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Project secret: {}",
        if config.project_secret.is_some() { "set" } else { "(not set)" }
    );
    println!(
        "Poll: interval {:?}, timeout {:?}, check timeout {:?}",
        config.poll.interval, config.poll.timeout, config.poll.check_timeout
    );
    println!(
        "Notify: {} attempts, base {:?}, cap {:?}, jitter ≤ {:?}, request timeout {:?}",
        config.backoff.max_attempts,
        config.backoff.base_delay,
        config.backoff.max_delay,
        config.backoff.max_jitter,
        config.request_timeout
    );
    Ok(())
}

fn print_record(record: &DeploymentRecord) {
    println!("Task: {}", record.task_id);
    println!("Round: {}", record.round);
    println!("State: {}", record.state.name());
    match &record.state {
        DeploymentState::Failed { stage, reason } => {
            println!("Failed at: {}", stage);
            println!("Reason: {}", reason);
        }
        DeploymentState::Skipped { reason } => println!("Reason: {}", reason),
        _ => {}
    }
    println!("Key: {}", record.deployment_key);
    if let Some(ref repo) = record.repository {
        println!("Repository: {}", repo.url);
    }
    if let Some(ref sha) = record.last_commit_sha {
        println!("Commit: {}", sha);
    }
    if let Some(ref url) = record.pages_url {
        let live = match record.live {
            Some(true) => "live",
            Some(false) => "not confirmed",
            None => "unknown",
        };
        println!("Pages: {} ({})", url, live);
    }
    println!(
        "Counters: runs={} publishes={} poll_checks={} notify_attempts={}",
        record.counters.runs,
        record.counters.publishes,
        record.counters.poll_checks,
        record.counters.notify_attempts
    );
    println!("Updated: {}", record.updated_at);
}

/// First ten characters of a commit SHA
fn short_sha(sha: &str) -> String {
    sha.chars().take(10).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 32), "short");
        assert_eq!(truncate("ééééé", 3), "éé…");
    }

    #[test]
    fn test_short_sha_handles_any_record_value() {
        assert_eq!(short_sha(&"a".repeat(40)), "aaaaaaaaaa");
        assert_eq!(short_sha("abc"), "abc");
        assert_eq!(short_sha("ßßßßßßßßßßßß"), "ßßßßßßßßßß");
    }

    #[test]
    fn test_cli_parses_deploy_flags() {
        let cli = Cli::try_parse_from(["pagewright", "deploy", "task.json", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Deploy { file, dry_run } => {
                assert_eq!(file, Some(PathBuf::from("task.json")));
                assert!(dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
