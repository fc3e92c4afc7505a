//! pagewright - Deployment orchestrator for task sites
//!
//! Turns a validated task into a published GitHub Pages site and reports
//! the result to the task's evaluation endpoint.
//!
//! # Architecture
//!
//! Each task runs through a persisted state machine:
//! - Planning derives a content key and decides create vs. update
//! - Publishing pushes the full file set through the provider
//! - Polling waits (bounded) for the Pages URL to answer
//! - Notifying reports the outcome with exponential backoff
//!
//! Runs for the same task id are serialized; different tasks run in
//! parallel.
//!
//! # Modules
//!
//! - `adapters`: External systems (GitHub, HTTP, dry run)
//! - `core`: Identity, planning, polling, notification, orchestration
//! - `domain`: Data structures (Task, DeploymentRecord, FileSet)
//! - `intake`: Submission validation
//! - `site`: Templating and attachment decoding
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Deploy a submission
//! pagewright deploy submission.json
//!
//! # Check a deployment
//! pagewright status <task-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod intake;
pub mod site;

// Re-export main types at crate root for convenience
pub use crate::core::{DeploymentKey, Orchestrator};
pub use domain::{DeploymentRecord, DeploymentState, Round, Task};
