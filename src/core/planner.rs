//! Revision planning: create a deployment, update it, or leave it alone.
//!
//! The file set is always recomputed from the incoming task, so applying a
//! plan twice yields the same repository tree.

use std::sync::Arc;

use thiserror::Error;

use super::identity::{self, DeploymentKey};
use crate::domain::{DeploymentRecord, FileSet, RepoRef, Round, Task};
use crate::site::{attachment_files, SiteRenderer};

/// What the orchestrator should do with the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// First publish for this task
    CreateNew { repo_name: String },

    /// Push a fresh tree to an existing repository
    UpdateExisting { repo: RepoRef },

    /// The same content is already published; skip the provider
    Unchanged { repo: RepoRef, commit_sha: String },
}

/// Planner output
#[derive(Debug, Clone)]
pub struct RevisionPlan {
    pub key: DeploymentKey,
    pub action: PlanAction,
    pub files: FileSet,
}

/// Planning errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Revision for task '{task_id}' has no prior deployment")]
    InvalidRevision { task_id: String },
}

/// Decides create-vs-update and renders the file set
pub struct RevisionPlanner {
    renderer: Arc<dyn SiteRenderer>,
}

impl RevisionPlanner {
    pub fn new(renderer: Arc<dyn SiteRenderer>) -> Self {
        Self { renderer }
    }

    /// Plan a run for `task` given the task's existing record, if any
    pub fn plan(
        &self,
        task: &Task,
        existing: Option<&DeploymentRecord>,
    ) -> Result<RevisionPlan, PlanError> {
        let key = identity::derive(task);
        let action = decide(task, &key, existing)?;

        Ok(RevisionPlan {
            key,
            action,
            files: self.files_for(task),
        })
    }

    /// Rendered site overlaid with the task's attachments
    pub fn files_for(&self, task: &Task) -> FileSet {
        let mut files = self.renderer.render(task);
        files.extend(attachment_files(&task.attachments));
        files
    }
}

fn decide(
    task: &Task,
    key: &DeploymentKey,
    existing: Option<&DeploymentRecord>,
) -> Result<PlanAction, PlanError> {
    let published = existing.filter(|r| r.has_published());

    if task.round == Round::Revision && published.is_none() {
        return Err(PlanError::InvalidRevision {
            task_id: task.task_id.clone(),
        });
    }

    if let Some(record) = published {
        if let (Some(repo), Some(sha)) = (&record.repository, &record.last_commit_sha) {
            // Rendered files depend on the round, so the key alone is not enough
            if &record.deployment_key == key && record.published_round == Some(task.round) {
                return Ok(PlanAction::Unchanged {
                    repo: repo.clone(),
                    commit_sha: sha.clone(),
                });
            }
            return Ok(PlanAction::UpdateExisting { repo: repo.clone() });
        }
    }

    // A repository created by an earlier run whose push failed is reused
    if let Some(repo) = existing.and_then(|r| r.repository.clone()) {
        return Ok(PlanAction::UpdateExisting { repo });
    }

    Ok(PlanAction::CreateNew {
        repo_name: identity::repository_name(&task.task_id, key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attachment;
    use crate::site::StaticSite;

    fn planner() -> RevisionPlanner {
        RevisionPlanner::new(Arc::new(StaticSite::new("octocat", 2025)))
    }

    fn repo() -> RepoRef {
        RepoRef {
            owner: "octocat".into(),
            name: "task-t1-abc".into(),
            url: "https://github.com/octocat/task-t1-abc".into(),
        }
    }

    fn published_record(task: &Task) -> DeploymentRecord {
        let mut record = DeploymentRecord::new(&task.task_id, identity::derive(task), task.round);
        record.repository = Some(repo());
        record.last_commit_sha = Some("sha-1".into());
        record.published_round = Some(task.round);
        record.pages_url = Some("https://octocat.github.io/task-t1-abc/".into());
        record
    }

    #[test]
    fn test_new_task_creates() {
        let task = Task::new("t1", Round::Initial, "brief", "http://e");
        let plan = planner().plan(&task, None).unwrap();

        match plan.action {
            PlanAction::CreateNew { repo_name } => {
                assert_eq!(repo_name, format!("task-t1-{}", plan.key.short()))
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(plan.files.contains("index.html"));
    }

    #[test]
    fn test_revision_without_deployment_is_invalid() {
        let task = Task::new("t1", Round::Revision, "brief", "http://e");
        assert_eq!(
            planner().plan(&task, None).unwrap_err(),
            PlanError::InvalidRevision {
                task_id: "t1".into()
            }
        );

        // A record that never published does not count
        let record = DeploymentRecord::new("t1", identity::derive(&task), Round::Initial);
        assert!(planner().plan(&task, Some(&record)).is_err());
    }

    #[test]
    fn test_revision_updates_existing_repo() {
        let original = Task::new("t1", Round::Initial, "brief", "http://e");
        let record = published_record(&original);

        let revision = Task::new("t1", Round::Revision, "new brief", "http://e");
        let plan = planner().plan(&revision, Some(&record)).unwrap();

        assert_eq!(plan.action, PlanAction::UpdateExisting { repo: repo() });
        let html = String::from_utf8(plan.files.get("index.html").unwrap().to_vec()).unwrap();
        assert!(html.contains("new brief"));
    }

    #[test]
    fn test_identical_resubmission_is_unchanged() {
        let task = Task::new("t1", Round::Initial, "brief", "http://e");
        let record = published_record(&task);

        let plan = planner().plan(&task, Some(&record)).unwrap();
        assert_eq!(
            plan.action,
            PlanAction::Unchanged {
                repo: repo(),
                commit_sha: "sha-1".into()
            }
        );
    }

    #[test]
    fn test_same_content_in_new_round_is_pushed() {
        let original = Task::new("t1", Round::Initial, "brief", "http://e");
        let record = published_record(&original);

        let revision = Task::new("t1", Round::Revision, "brief", "http://e");
        let plan = planner().plan(&revision, Some(&record)).unwrap();

        assert_eq!(plan.key, record.deployment_key);
        assert_eq!(plan.action, PlanAction::UpdateExisting { repo: repo() });
        let readme = String::from_utf8(plan.files.get("README.md").unwrap().to_vec()).unwrap();
        assert!(readme.contains("round 2"));
    }

    #[test]
    fn test_record_without_published_round_is_updated() {
        let task = Task::new("t1", Round::Initial, "brief", "http://e");
        let mut record = published_record(&task);
        record.published_round = None;

        let plan = planner().plan(&task, Some(&record)).unwrap();
        assert_eq!(plan.action, PlanAction::UpdateExisting { repo: repo() });
    }

    #[test]
    fn test_retry_after_failed_push_reuses_repo() {
        let task = Task::new("t1", Round::Initial, "brief", "http://e");
        let mut record = DeploymentRecord::new("t1", identity::derive(&task), Round::Initial);
        record.repository = Some(repo());

        let plan = planner().plan(&task, Some(&record)).unwrap();
        assert_eq!(plan.action, PlanAction::UpdateExisting { repo: repo() });
    }

    #[test]
    fn test_attachments_override_rendered_files() {
        let task = Task::new("t1", Round::Initial, "brief", "http://e")
            .with_attachment(Attachment::new("index.html", b"custom".to_vec()))
            .with_attachment(Attachment::new("data.csv", b"1,2".to_vec()));

        let files = planner().files_for(&task);
        assert_eq!(files.get("index.html"), Some(&b"custom"[..]));
        assert_eq!(files.get("data.csv"), Some(&b"1,2"[..]));
        assert!(files.contains("LICENSE"));
    }
}
