//! Deployment records and the deployment state machine.
//!
//! A record exists per task id and is only ever mutated by the orchestrator
//! while it holds that task's lock. It reflects confirmed outcomes only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::Round;
use crate::core::identity::DeploymentKey;

/// A repository on the hosting provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    /// Browser URL of the repository
    pub url: String,
}

impl RepoRef {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Stage of the state machine a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Planning,
    Publishing,
    Polling,
    Notifying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Planning => "planning",
            Self::Publishing => "publishing",
            Self::Polling => "polling",
            Self::Notifying => "notifying",
        };
        f.write_str(name)
    }
}

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Round 2 for a task that was never deployed
    InvalidRevision,

    /// Provider call failed while publishing
    Provider,

    /// Evaluation endpoint never acknowledged
    NotifyExhausted,

    /// Run abandoned because the process is shutting down
    Cancelled,
}

/// Why a run ended without success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Deployment state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum DeploymentState {
    Received,
    Planning,
    Publishing,
    Polling,
    Notifying,
    Done,
    Failed { stage: Stage, reason: FailureReason },
    Skipped { reason: FailureReason },
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::Received
    }
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed { .. } | Self::Skipped { .. }
        )
    }

    /// Stage of a non-terminal state
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Received => Some(Stage::Received),
            Self::Planning => Some(Stage::Planning),
            Self::Publishing => Some(Stage::Publishing),
            Self::Polling => Some(Stage::Polling),
            Self::Notifying => Some(Stage::Notifying),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &DeploymentState) -> bool {
        use DeploymentState::*;

        match (self, next) {
            // Any non-terminal state may fail
            (from, Failed { .. }) => !from.is_terminal(),
            // A finished record starts over on resubmission
            (from, Received) => from.is_terminal(),
            (Received, Planning) => true,
            (Planning, Publishing) | (Planning, Skipped { .. }) => true,
            (Publishing, Polling) => true,
            (Polling, Notifying) => true,
            (Notifying, Done) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Planning => "planning",
            Self::Publishing => "publishing",
            Self::Polling => "polling",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Errors raised by record bookkeeping
#[derive(Debug, Clone, Error)]
pub enum DeploymentError {
    #[error("Invalid state transition: {from} → {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Per-record attempt counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounters {
    /// Orchestration runs started for this task
    pub runs: u32,

    /// Successful pushes
    pub publishes: u32,

    /// Reachability checks issued across all runs
    pub poll_checks: u32,

    /// Notification requests issued across all runs
    pub notify_attempts: u32,
}

/// The deployment record for one task id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub task_id: String,

    /// Key of the content most recently published (or attempted, before
    /// the first publish succeeds)
    pub deployment_key: DeploymentKey,

    /// Round of the most recent run
    pub round: Round,

    #[serde(default)]
    pub repository: Option<RepoRef>,

    #[serde(default)]
    pub last_commit_sha: Option<String>,

    /// Round whose files produced `last_commit_sha`
    #[serde(default)]
    pub published_round: Option<Round>,

    #[serde(default)]
    pub pages_url: Option<String>,

    /// Whether the pages URL was confirmed reachable in the latest run
    #[serde(default)]
    pub live: Option<bool>,

    #[serde(flatten)]
    pub state: DeploymentState,

    /// Most recent failure, kept after later successes for operators
    #[serde(default)]
    pub last_error: Option<FailureReason>,

    #[serde(default)]
    pub counters: AttemptCounters,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Create a fresh record in the `Received` state
    pub fn new(task_id: impl Into<String>, deployment_key: DeploymentKey, round: Round) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            deployment_key,
            round,
            repository: None,
            last_commit_sha: None,
            published_round: None,
            pages_url: None,
            live: None,
            state: DeploymentState::Received,
            last_error: None,
            counters: AttemptCounters::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a commit has ever been pushed for this task
    pub fn has_published(&self) -> bool {
        self.repository.is_some() && self.last_commit_sha.is_some()
    }

    /// Reset to `Received` for a new run.
    ///
    /// A non-terminal state here means a previous process stopped mid-run;
    /// nothing past the last confirmed outcome was recorded, so it is safe
    /// to start over.
    pub fn begin_run(&mut self, round: Round) {
        self.round = round;
        self.state = DeploymentState::Received;
        self.live = None;
        self.counters.runs += 1;
        self.touch();
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: DeploymentState) -> Result<(), DeploymentError> {
        if !self.state.can_transition_to(&next) {
            return Err(DeploymentError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }

        if let DeploymentState::Failed { reason, .. } | DeploymentState::Skipped { reason } = &next
        {
            self.last_error = Some(reason.clone());
        }

        self.state = next;
        self.touch();
        Ok(())
    }

    /// Fail from the current stage
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), DeploymentError> {
        let stage = self.state.stage().ok_or(DeploymentError::InvalidTransition {
            from: self.state.name(),
            to: "failed",
        })?;
        self.transition(DeploymentState::Failed { stage, reason })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
