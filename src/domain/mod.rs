//! Domain types for the pagewright orchestrator.
//!
//! This module contains the core data structures:
//! - Task: Validated deployment requests
//! - DeploymentRecord: Per-task state owned by the orchestrator
//! - FileSet: Content published to a repository

pub mod fileset;
pub mod record;
pub mod task;

// Re-export commonly used types
pub use fileset::FileSet;
pub use record::{
    AttemptCounters, DeploymentError, DeploymentRecord, DeploymentState, FailureKind,
    FailureReason, RepoRef, Stage,
};
pub use task::{Attachment, Round, Task, TaskMeta};
