//! GitHub provider backed by the `gh` and `git` CLIs.
//!
//! Every command runs as a subprocess with a timeout. Authentication is
//! whatever `gh auth` is configured with on the host.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::Provider;
use crate::domain::{FileSet, RepoRef};

/// Branch published to Pages
const BRANCH: &str = "main";

/// Settings for the GitHub provider
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Account that owns created repositories
    pub owner: String,

    /// Commit author name (defaults to the owner)
    pub author_name: Option<String>,

    /// Commit author email (defaults to the owner's noreply address)
    pub author_email: Option<String>,

    /// Upper bound for any single `gh`/`git` invocation
    pub command_timeout: Duration,
}

impl GitHubConfig {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            author_name: None,
            author_email: None,
            command_timeout: Duration::from_secs(120),
        }
    }

    fn author_name(&self) -> &str {
        self.author_name.as_deref().unwrap_or(&self.owner)
    }

    fn author_email(&self) -> String {
        self.author_email
            .clone()
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", self.owner))
    }
}

/// Provider that drives GitHub through `gh` and `git`
pub struct GitHubProvider {
    config: GitHubConfig,
    gh_binary: String,
    git_binary: String,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            config,
            gh_binary: "gh".to_string(),
            git_binary: "git".to_string(),
        }
    }

    /// Use custom binary paths (e.g. wrappers in CI)
    pub fn with_binaries(mut self, gh: impl Into<String>, git: impl Into<String>) -> Self {
        self.gh_binary = gh.into();
        self.git_binary = git.into();
        self
    }

    /// Repository browser URL
    pub fn repo_url(&self, name: &str) -> String {
        format!("https://github.com/{}/{}", self.config.owner, name)
    }

    /// Public Pages URL for a repository
    pub fn pages_url(&self, name: &str) -> String {
        format!(
            "https://{}.github.io/{}/",
            self.config.owner.to_lowercase(),
            name
        )
    }

    /// Run a command to completion, returning stdout
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
        debug!(program, ?args, "Running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", program))?;

        let output = timeout(self.config.command_timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "'{} {}' timed out after {:?}",
                    program,
                    args.join(" "),
                    self.config.command_timeout
                )
            })?
            .with_context(|| format!("Failed to wait for '{}'", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{} {}' failed with exit code {}: {}",
                program,
                args.join(" "),
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("'{}' output is not valid UTF-8", program))
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        self.run(&self.git_binary, args, Some(cwd)).await
    }

    async fn gh(&self, args: &[&str]) -> Result<String> {
        self.run(&self.gh_binary, args, None).await
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn name(&self) -> &str {
        "github"
    }

    async fn create_public_repo(&self, name: &str) -> Result<RepoRef> {
        let full_name = format!("{}/{}", self.config.owner, name);

        let url = match self
            .gh(&["repo", "view", &full_name, "--json", "url", "--jq", ".url"])
            .await
        {
            Ok(url) if !url.trim().is_empty() => {
                info!(repo = %full_name, "Repository already exists");
                url.trim().to_string()
            }
            _ => {
                info!(repo = %full_name, "Creating public repository");
                self.gh(&["repo", "create", &full_name, "--public"])
                    .await
                    .with_context(|| format!("Failed to create repository {}", full_name))?;
                self.repo_url(name)
            }
        };

        Ok(RepoRef {
            owner: self.config.owner.clone(),
            name: name.to_string(),
            url,
        })
    }

    async fn push_files(&self, repo: &RepoRef, files: &FileSet, message: &str) -> Result<String> {
        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let work = scratch.path().join(&repo.name);
        let work_str = work.to_string_lossy().to_string();

        self.gh(&["repo", "clone", &repo.full_name(), &work_str])
            .await
            .with_context(|| format!("Failed to clone {}", repo.full_name()))?;

        self.git(&["checkout", "-B", BRANCH], &work).await?;

        // Full overwrite: nothing from the previous tree survives
        clear_worktree(&work).await?;
        write_files(&work, files).await?;

        let name_cfg = format!("user.name={}", self.config.author_name());
        let email_cfg = format!("user.email={}", self.config.author_email());

        self.git(&["add", "-A"], &work).await?;
        self.git(
            &[
                "-c",
                &name_cfg,
                "-c",
                &email_cfg,
                "commit",
                "--allow-empty",
                "-m",
                message,
            ],
            &work,
        )
        .await?;
        self.git(&["push", "origin", BRANCH], &work)
            .await
            .with_context(|| format!("Failed to push to {}", repo.full_name()))?;

        let sha = self.git(&["rev-parse", "HEAD"], &work).await?;
        Ok(sha.trim().to_string())
    }

    async fn enable_hosting(&self, repo: &RepoRef) -> Result<String> {
        let endpoint = format!("repos/{}/pages", repo.full_name());
        let branch_field = format!("source[branch]={}", BRANCH);

        let result = self
            .gh(&[
                "api",
                "-X",
                "POST",
                &endpoint,
                "-f",
                &branch_field,
                "-f",
                "source[path]=/",
            ])
            .await;

        match result {
            Ok(_) => info!(repo = %repo.full_name(), "Pages enabled"),
            Err(e) if is_already_enabled(&e) => {
                debug!(repo = %repo.full_name(), "Pages already enabled")
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to enable Pages for {}", repo.full_name()))
            }
        }

        Ok(self.pages_url(&repo.name))
    }

    async fn health_check(&self) -> Result<()> {
        self.gh(&["auth", "status"])
            .await
            .context("gh is not authenticated")?;
        self.run(&self.git_binary, &["--version"], None)
            .await
            .context("git is not available")?;
        Ok(())
    }
}

/// `gh api` reports 409 when Pages is already configured
fn is_already_enabled(error: &anyhow::Error) -> bool {
    let message = format!("{:#}", error).to_lowercase();
    message.contains("409") || message.contains("already enabled")
}

/// Remove everything in the checkout except `.git`
async fn clear_worktree(dir: &Path) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        let removed = if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    Ok(())
}

async fn write_files(dir: &Path, files: &FileSet) -> Result<()> {
    for (path, content) in files.iter() {
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, content)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
    }
    Ok(())
}
