//! Group-wise action execution
//!
//! [`ExecutionEngine::run`] drives one artifact through its execution plan:
//! file actions inside a ready group run concurrently, shell actions run
//! sequentially in stream order, and the two interleave within the group.
//! A failed action is contained to itself and its dependents; unrelated
//! actions keep running. All status changes go through the registry so they
//! hit the transition table and the event log.

use crate::cancel::CancelToken;
use crate::collaborator::{ExitOutcome, FsError, ShellError, ShellRunner, WorkspaceFs};
use crate::error::EngineError;
use crate::locks::PathLocks;
use crate::registry::{ArtifactStore, StoreError};
use crate::resolve::ExecutionPlan;
use anvil_action::{ActionId, ActionPayload, ActionStatus, ArtifactId, FileContent};
use anvil_patch::PatchError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Why one action ended `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ExecFailure {
    /// A diff did not apply against the current file state.
    #[error(transparent)]
    Reconcile(#[from] PatchError),

    /// The file-system collaborator failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The shell collaborator failed to run the command at all.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// The command ran but exited non-zero.
    #[error("command exited with code {code}")]
    NonZeroExit {
        /// The process exit code.
        code: i32,
    },
}

/// Automatic replay of failed actions, exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 means no retry.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before the retry following attempt number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Replay failed actions automatically; `None` leaves replay to callers.
    pub retry: Option<RetryPolicy>,
}

/// Outcome of one [`ExecutionEngine::run`] call.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Final status of every action, in stream order.
    pub statuses: IndexMap<ActionId, ActionStatus>,
    /// First failure per action that ended `Failed`.
    pub failures: IndexMap<ActionId, ExecFailure>,
}

impl ExecutionReport {
    /// Whether every action completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.statuses
            .values()
            .all(|status| *status == ActionStatus::Complete)
    }

    /// Final status of one action, if it was part of the run.
    #[must_use]
    pub fn status(&self, id: &ActionId) -> Option<ActionStatus> {
        self.statuses.get(id).copied()
    }
}

enum StepOutcome {
    Done,
    Cancelled,
}

/// Drives artifacts against a workspace through injected collaborators.
pub struct ExecutionEngine {
    config: EngineConfig,
    fs: Arc<dyn WorkspaceFs>,
    shell: Arc<dyn ShellRunner>,
    locks: PathLocks,
}

impl ExecutionEngine {
    /// New engine with its own path lock set.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        fs: Arc<dyn WorkspaceFs>,
        shell: Arc<dyn ShellRunner>,
    ) -> Self {
        Self::with_locks(config, fs, shell, PathLocks::new())
    }

    /// New engine sharing a lock set with other engines on the same workspace.
    #[must_use]
    pub fn with_locks(
        config: EngineConfig,
        fs: Arc<dyn WorkspaceFs>,
        shell: Arc<dyn ShellRunner>,
        locks: PathLocks,
    ) -> Self {
        Self {
            config,
            fs,
            shell,
            locks,
        }
    }

    /// Run every pending action of one artifact to a terminal state.
    ///
    /// Already-terminal actions are skipped, so calling `run` again after
    /// re-issuing failed actions replays exactly those. When the token is
    /// cancelled mid-run, in-flight actions settle to `Aborted` and
    /// everything not yet started is aborted wholesale before returning.
    ///
    /// # Errors
    /// [`EngineError`] when the artifact is unknown or its dependency graph
    /// cannot be planned. Per-action failures are reported, not returned.
    pub async fn run(
        &self,
        store: &ArtifactStore,
        artifact_id: &ArtifactId,
        cancel: &CancelToken,
    ) -> Result<ExecutionReport, EngineError> {
        let snapshot = store
            .snapshot(artifact_id)
            .ok_or_else(|| StoreError::NotFound {
                artifact_id: artifact_id.clone(),
            })?;
        let plan = ExecutionPlan::resolve(&snapshot)?;
        tracing::info!(
            artifact = %artifact_id,
            actions = plan.action_count(),
            "starting artifact run"
        );

        let failures: Mutex<IndexMap<ActionId, ExecFailure>> = Mutex::new(IndexMap::new());

        for group in plan.groups() {
            if cancel.is_cancelled() {
                break;
            }
            let mut file_ids = Vec::new();
            let mut shell_ids = Vec::new();
            for id in group {
                match store.action(artifact_id, id)?.payload {
                    ActionPayload::Shell { .. } => shell_ids.push(id),
                    ActionPayload::File { .. } => file_ids.push(id),
                }
            }

            let files = futures::future::join_all(file_ids.iter().map(|id| {
                self.drive_action(store, &plan, artifact_id, id, cancel, &failures)
            }));
            let shells = async {
                let mut results = Vec::with_capacity(shell_ids.len());
                for id in &shell_ids {
                    results.push(
                        self.drive_action(store, &plan, artifact_id, id, cancel, &failures)
                            .await,
                    );
                }
                results
            };
            let (file_results, shell_results) = tokio::join!(files, shells);
            for result in file_results.into_iter().chain(shell_results) {
                result?;
            }
        }

        if cancel.is_cancelled() {
            tracing::info!(artifact = %artifact_id, "run cancelled, aborting unfinished actions");
            store.abort_unfinished(artifact_id)?;
        }

        let statuses = store
            .list_actions(artifact_id)?
            .into_iter()
            .map(|action| (action.id, action.status))
            .collect();
        Ok(ExecutionReport {
            statuses,
            failures: failures.into_inner(),
        })
    }

    /// Run one action through the status machine, retries included.
    async fn drive_action(
        &self,
        store: &ArtifactStore,
        plan: &ExecutionPlan,
        artifact_id: &ArtifactId,
        action_id: &ActionId,
        cancel: &CancelToken,
        failures: &Mutex<IndexMap<ActionId, ExecFailure>>,
    ) -> Result<(), StoreError> {
        if store.status(artifact_id, action_id)? != ActionStatus::Pending {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Ok(());
        }
        for dependency in plan.dependencies_of(action_id) {
            if store.status(artifact_id, dependency)? != ActionStatus::Complete {
                tracing::debug!(
                    artifact = %artifact_id,
                    action = %action_id,
                    blocked_on = %dependency,
                    "dependency not complete, leaving action pending"
                );
                return Ok(());
            }
        }

        let mut attempt: u32 = 0;
        loop {
            store.transition(artifact_id, action_id, ActionStatus::Running)?;
            let payload = store.action(artifact_id, action_id)?.payload;
            match self.execute(&payload, cancel).await {
                Ok(StepOutcome::Done) => {
                    store.transition(artifact_id, action_id, ActionStatus::Complete)?;
                    failures.lock().shift_remove(action_id);
                    return Ok(());
                }
                Ok(StepOutcome::Cancelled) => {
                    store.transition(artifact_id, action_id, ActionStatus::Aborted)?;
                    return Ok(());
                }
                Err(failure) => {
                    tracing::warn!(
                        artifact = %artifact_id,
                        action = %action_id,
                        attempt,
                        error = %failure,
                        "action failed"
                    );
                    store.transition(artifact_id, action_id, ActionStatus::Failed)?;
                    // Keep the first failure per action across retries.
                    failures.lock().entry(action_id.clone()).or_insert(failure);

                    let retry = match self.config.retry {
                        Some(policy) if attempt + 1 < policy.max_attempts => policy,
                        _ => return Ok(()),
                    };
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    store.reissue(artifact_id, action_id)?;
                    attempt += 1;
                }
            }
        }
    }

    /// Apply one payload against the workspace.
    ///
    /// File actions hold the path lock across read, reconcile and write so
    /// a concurrent action on the same path cannot interleave.
    async fn execute(
        &self,
        payload: &ActionPayload,
        cancel: &CancelToken,
    ) -> Result<StepOutcome, ExecFailure> {
        match payload {
            ActionPayload::File { path, content } => {
                let _guard = self.locks.lock(path).await;
                let baseline = self.fs.read(path).await?.unwrap_or_default();
                let next = match content {
                    FileContent::Full(text) => text.clone(),
                    FileContent::Diff(patch) => patch.apply(&baseline)?,
                };
                self.fs.write(path, &next).await?;
                Ok(StepOutcome::Done)
            }
            ActionPayload::Shell { command } => {
                match self.shell.exec(command, cancel).await? {
                    outcome if outcome.is_success() => Ok(StepOutcome::Done),
                    ExitOutcome::Cancelled => Ok(StepOutcome::Cancelled),
                    ExitOutcome::Exited(code) => Err(ExecFailure::NonZeroExit { code }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(50));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
    }

    #[test]
    fn report_success_requires_every_action_complete() {
        let mut statuses = IndexMap::new();
        statuses.insert(ActionId::from("a"), ActionStatus::Complete);
        statuses.insert(ActionId::from("b"), ActionStatus::Pending);
        let report = ExecutionReport {
            statuses,
            failures: IndexMap::new(),
        };
        assert!(!report.is_success());
        assert_eq!(report.status(&"b".into()), Some(ActionStatus::Pending));
        assert_eq!(report.status(&"missing".into()), None);
    }
}
