//! Main orchestrator for task deployment.
//!
//! Runs the deployment state machine for one task at a time per task id:
//! plan, publish, wait for Pages, notify. The record is persisted after
//! every transition and only ever reflects confirmed outcomes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::adapters::Provider;
use crate::domain::{
    DeploymentRecord, DeploymentState, FailureKind, FailureReason, RepoRef, Task,
};

use super::identity;
use super::notifier::{NotificationPayload, NotificationSender, NotifyOutcome};
use super::planner::{PlanAction, PlanError, RevisionPlan, RevisionPlanner};
use super::poller::{PollOutcome, PublishPoller};
use super::record_store::{RecordStore, TaskLease};

/// Confirmed result of the publishing stage
#[derive(Debug, Clone)]
struct Published {
    repo: RepoRef,
    commit_sha: String,
    pages_url: String,
}

/// Main deployment orchestrator
pub struct Orchestrator {
    store: Arc<RecordStore>,
    provider: Arc<dyn Provider>,
    planner: RevisionPlanner,
    poller: PublishPoller,
    notifier: NotificationSender,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        store: Arc<RecordStore>,
        provider: Arc<dyn Provider>,
        planner: RevisionPlanner,
        poller: PublishPoller,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            store,
            provider,
            planner,
            poller,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. tied to shutdown)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that abandons in-flight polling and notification when cancelled
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Start a run in the background and return immediately
    pub fn submit(self: &Arc<Self>, task: Task) -> JoinHandle<Result<DeploymentRecord>> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let task_id = task.task_id.clone();
            let result = this.run(task).await;
            if let Err(ref e) = result {
                error!(%task_id, error = %format!("{:#}", e), "Deployment run aborted");
            }
            result
        })
    }

    /// Run the full state machine for `task`.
    ///
    /// Waits for any in-flight run of the same task id. Terminal failures are
    /// returned as a record in the `Failed`/`Skipped` state; `Err` means the
    /// record itself could not be persisted.
    #[instrument(skip(self, task), fields(task_id = %task.task_id, round = %task.round))]
    pub async fn run(&self, task: Task) -> Result<DeploymentRecord> {
        let lease = self.store.lock(&task.task_id).await;
        let existing = self.store.get(&task.task_id).await;

        let mut record = match existing.clone() {
            Some(record) => {
                if !record.state.is_terminal() {
                    warn!(state = record.state.name(), "Previous run was interrupted");
                }
                record
            }
            None => DeploymentRecord::new(&task.task_id, identity::derive(&task), task.round),
        };

        record.begin_run(task.round);
        info!(run = record.counters.runs, "Deployment received");
        self.save(&lease, &record).await?;

        // Planning
        self.advance(&lease, &mut record, DeploymentState::Planning)
            .await?;
        let plan = match self.planner.plan(&task, existing.as_ref()) {
            Ok(plan) => plan,
            Err(e @ PlanError::InvalidRevision { .. }) => {
                warn!(error = %e, "Skipping revision");
                let reason = FailureReason::new(FailureKind::InvalidRevision, e.to_string());
                self.advance(&lease, &mut record, DeploymentState::Skipped { reason })
                    .await?;
                return Ok(record);
            }
        };
        info!(key = %plan.key, files = plan.files.len(), action = ?plan.action, "Plan ready");

        // Publishing
        self.advance(&lease, &mut record, DeploymentState::Publishing)
            .await?;
        let published = match self.publish(&task, &plan, &mut record).await {
            Ok(published) => published,
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Publishing failed");
                record.fail(FailureReason::new(FailureKind::Provider, message))?;
                self.save(&lease, &record).await?;
                return Ok(record);
            }
        };
        self.save(&lease, &record).await?;

        // Polling
        self.advance(&lease, &mut record, DeploymentState::Polling)
            .await?;
        let poll = self
            .poller
            .wait_until_live(&published.pages_url, &self.cancel)
            .await;
        record.counters.poll_checks += poll.checks();
        let live = match poll {
            PollOutcome::Live { .. } => true,
            PollOutcome::TimedOut { .. } => false,
            PollOutcome::Cancelled { .. } => {
                return self.abandon(&lease, &mut record).await;
            }
        };
        record.live = Some(live);

        // Notifying
        self.advance(&lease, &mut record, DeploymentState::Notifying)
            .await?;
        let payload = NotificationPayload {
            email: task.meta.email.clone(),
            task: task.task_id.clone(),
            round: task.round.number(),
            nonce: task.meta.nonce.clone(),
            repo_url: published.repo.url.clone(),
            commit_sha: published.commit_sha.clone(),
            pages_url: published.pages_url.clone(),
            live,
        };
        let outcome = self
            .notifier
            .notify(&task.evaluation_url, &payload, &self.cancel)
            .await;
        record.counters.notify_attempts += outcome.attempts();

        match outcome {
            NotifyOutcome::Delivered { attempts } => {
                info!(attempts, live, "Deployment reported");
                self.advance(&lease, &mut record, DeploymentState::Done)
                    .await?;
            }
            NotifyOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(attempts, %last_error, "Evaluation endpoint never acknowledged; task failed");
                record.fail(FailureReason::new(
                    FailureKind::NotifyExhausted,
                    format!("gave up after {} attempts: {}", attempts, last_error),
                ))?;
                self.save(&lease, &record).await?;
            }
            NotifyOutcome::Cancelled { .. } => {
                return self.abandon(&lease, &mut record).await;
            }
        }

        Ok(record)
    }

    /// Apply the plan through the provider.
    ///
    /// Each confirmed provider outcome is written into `record` as it
    /// happens, so a later failure keeps everything that did succeed.
    async fn publish(
        &self,
        task: &Task,
        plan: &RevisionPlan,
        record: &mut DeploymentRecord,
    ) -> Result<Published> {
        let (repo, commit_sha) = match &plan.action {
            PlanAction::Unchanged { repo, commit_sha } => {
                info!(repo = %repo.full_name(), "Content unchanged, skipping push");
                (repo.clone(), commit_sha.clone())
            }
            PlanAction::CreateNew { repo_name } => {
                let repo = self
                    .provider
                    .create_public_repo(repo_name)
                    .await
                    .with_context(|| format!("Failed to create repository '{}'", repo_name))?;
                info!(repo = %repo.full_name(), "Repository ready");
                record.repository = Some(repo.clone());

                let sha = self.push(task, plan, &repo, record).await?;
                (repo, sha)
            }
            PlanAction::UpdateExisting { repo } => {
                let sha = self.push(task, plan, repo, record).await?;
                (repo.clone(), sha)
            }
        };

        let pages_url = match record.pages_url.clone() {
            Some(url) => url,
            None => {
                let url = self
                    .provider
                    .enable_hosting(&repo)
                    .await
                    .with_context(|| format!("Failed to enable hosting for '{}'", repo.full_name()))?;
                info!(%url, "Hosting enabled");
                record.pages_url = Some(url.clone());
                url
            }
        };

        Ok(Published {
            repo,
            commit_sha,
            pages_url,
        })
    }

    async fn push(
        &self,
        task: &Task,
        plan: &RevisionPlan,
        repo: &RepoRef,
        record: &mut DeploymentRecord,
    ) -> Result<String> {
        let message = format!(
            "Round {} deployment for {} ({})",
            task.round,
            task.task_id,
            plan.key.short()
        );

        let sha = self
            .provider
            .push_files(repo, &plan.files, &message)
            .await
            .with_context(|| format!("Failed to push files to '{}'", repo.full_name()))?;
        info!(repo = %repo.full_name(), %sha, "Files pushed");

        record.last_commit_sha = Some(sha.clone());
        record.published_round = Some(task.round);
        record.deployment_key = plan.key.clone();
        record.counters.publishes += 1;
        Ok(sha)
    }

    /// Mark the run abandoned because of shutdown
    async fn abandon(&self, lease: &TaskLease, record: &mut DeploymentRecord) -> Result<DeploymentRecord> {
        warn!(state = record.state.name(), "Run cancelled");
        record.fail(FailureReason::new(
            FailureKind::Cancelled,
            "shutdown requested before the run finished",
        ))?;
        self.save(lease, record).await?;
        Ok(record.clone())
    }

    async fn advance(
        &self,
        lease: &TaskLease,
        record: &mut DeploymentRecord,
        next: DeploymentState,
    ) -> Result<()> {
        record.transition(next)?;
        self.save(lease, record).await
    }

    async fn save(&self, lease: &TaskLease, record: &DeploymentRecord) -> Result<()> {
        self.store
            .put(lease, record)
            .await
            .with_context(|| format!("Failed to persist record for task '{}'", record.task_id))
    }

    /// Current record for a task id
    pub async fn status(&self, task_id: &str) -> Option<DeploymentRecord> {
        self.store.get(task_id).await
    }

    /// Records, most recently updated first
    pub async fn list(&self, limit: usize) -> Vec<DeploymentRecord> {
        let mut records = self.store.list().await;
        records.truncate(limit);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DryRunProbe, DryRunProvider, Transport};
    use crate::core::notifier::BackoffPolicy;
    use crate::core::poller::PollSettings;
    use crate::domain::Round;
    use crate::site::StaticSite;
    use async_trait::async_trait;

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn post_json(&self, _url: &str, _body: &serde_json::Value) -> Result<u16> {
            Ok(200)
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(RecordStore::in_memory()),
            Arc::new(DryRunProvider::new("octocat")),
            RevisionPlanner::new(Arc::new(StaticSite::new("octocat", 2025))),
            PublishPoller::new(Arc::new(DryRunProbe), PollSettings::default()),
            NotificationSender::new(Arc::new(OkTransport), BackoffPolicy::default()),
        )
    }

    #[tokio::test]
    async fn test_dry_run_reaches_done() {
        let orch = orchestrator();
        let task = Task::new("demo", Round::Initial, "Hello", "http://eval.test/notify");

        let record = orch.run(task).await.unwrap();
        assert_eq!(record.state, DeploymentState::Done);
        assert_eq!(record.live, Some(true));
        assert!(record.pages_url.unwrap().starts_with("https://octocat.github.io/task-demo-"));
        assert_eq!(record.counters.publishes, 1);
        assert_eq!(record.counters.notify_attempts, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_failed_not_done() {
        let orch = orchestrator();
        orch.cancellation().cancel();

        let task = Task::new("demo", Round::Initial, "Hello", "http://eval.test/notify");
        let record = orch.run(task).await.unwrap();

        match record.state {
            DeploymentState::Failed { reason, .. } => assert_eq!(reason.kind, FailureKind::Cancelled),
            other => panic!("unexpected state {:?}", other),
        }
        // The publish itself was confirmed and is kept
        assert!(record.last_commit_sha.is_some());
    }
}
