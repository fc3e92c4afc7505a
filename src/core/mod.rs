//! Core orchestration logic.
//!
//! This module contains:
//! - Identity: Content-derived deployment keys
//! - Planner: Create-vs-update decisions
//! - Poller: Publish-readiness polling
//! - Notifier: Result delivery with backoff
//! - RecordStore: Keyed records with per-task locks
//! - Orchestrator: The deployment state machine

pub mod identity;
pub mod notifier;
pub mod orchestrator;
pub mod planner;
pub mod poller;
pub mod record_store;

// Re-export commonly used types
pub use identity::{derive, repository_name, DeploymentKey};
pub use notifier::{BackoffPolicy, NotificationPayload, NotificationSender, NotifyOutcome};
pub use orchestrator::Orchestrator;
pub use planner::{PlanAction, PlanError, RevisionPlan, RevisionPlanner};
pub use poller::{PollOutcome, PollSettings, PublishPoller};
pub use record_store::{RecordEntry, RecordStore, TaskLease};
