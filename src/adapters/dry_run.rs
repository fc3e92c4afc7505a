//! Side-effect-free provider for rehearsals.
//!
//! Fabricates repository and Pages URLs for the configured owner and derives
//! a commit SHA from the pushed content, so the rest of the pipeline
//! (polling, notification, record keeping) runs unchanged.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Probe, Provider};
use crate::domain::{FileSet, RepoRef};

/// Provider that records nothing remotely
pub struct DryRunProvider {
    owner: String,
}

impl DryRunProvider {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl Provider for DryRunProvider {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn create_public_repo(&self, name: &str) -> Result<RepoRef> {
        info!(repo = %name, "[dry-run] Would create public repository");
        Ok(RepoRef {
            owner: self.owner.clone(),
            name: name.to_string(),
            url: format!("https://github.com/{}/{}", self.owner, name),
        })
    }

    async fn push_files(&self, repo: &RepoRef, files: &FileSet, message: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(repo.full_name().as_bytes());
        hasher.update(message.as_bytes());
        for (path, content) in files.iter() {
            hasher.update(path.as_bytes());
            hasher.update(content);
        }
        // Git SHAs are 40 hex chars
        let sha = hex::encode(hasher.finalize())[..40].to_string();

        info!(
            repo = %repo.full_name(),
            files = files.len(),
            bytes = files.size_bytes(),
            %sha,
            "[dry-run] Would push files"
        );
        Ok(sha)
    }

    async fn enable_hosting(&self, repo: &RepoRef) -> Result<String> {
        info!(repo = %repo.full_name(), "[dry-run] Would enable Pages");
        Ok(format!(
            "https://{}.github.io/{}/",
            self.owner.to_lowercase(),
            repo.name
        ))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Probe that treats every page as live without touching the network
pub struct DryRunProbe;

#[async_trait]
impl Probe for DryRunProbe {
    async fn check(&self, _url: &str) -> Result<u16> {
        Ok(200)
    }
}
