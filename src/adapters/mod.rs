//! Adapter interfaces for external systems.
//!
//! The orchestrator only talks to the outside world through these traits,
//! so tests can substitute deterministic stubs:
//! - `Provider`: repository hosting (GitHub via `gh`/`git`, or dry run)
//! - `Probe`: reachability checks against a published page
//! - `Transport`: JSON delivery to the evaluation endpoint

pub mod dry_run;
pub mod github;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{FileSet, RepoRef};

// Re-export the concrete adapters
pub use dry_run::{DryRunProbe, DryRunProvider};
pub use github::{GitHubConfig, GitHubProvider};
pub use http::{HttpProbe, HttpTransport};

/// Repository hosting provider.
///
/// Every operation must be safe to retry; the orchestrator calls each at
/// most once per state transition.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Create a public repository, or return it if it already exists
    async fn create_public_repo(&self, name: &str) -> Result<RepoRef>;

    /// Replace the repository contents with `files` as a single new commit.
    ///
    /// Returns the commit SHA.
    async fn push_files(&self, repo: &RepoRef, files: &FileSet, message: &str) -> Result<String>;

    /// Turn on static hosting and return the public pages URL
    async fn enable_hosting(&self, repo: &RepoRef) -> Result<String>;

    /// Check that the provider is usable (credentials, tooling)
    async fn health_check(&self) -> Result<()>;
}

/// Reachability check for a published page
#[async_trait]
pub trait Probe: Send + Sync {
    /// Issue one request and return the HTTP status code
    async fn check(&self, url: &str) -> Result<u16>;
}

/// Delivery of a JSON document to the evaluation endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` and return the HTTP status code
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16>;
}

/// Whether a status code is in the 2xx class
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_class() {
        assert!(is_success(200));
        assert!(is_success(204));
        assert!(!is_success(199));
        assert!(!is_success(301));
        assert!(!is_success(404));
        assert!(!is_success(503));
    }
}
