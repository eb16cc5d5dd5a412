//! Artifact registry
//!
//! Keyed store of artifacts and their actions, addressable by message and
//! artifact id for update and replay. The store is an explicit injected
//! handle, not ambient process state; all status mutations funnel through
//! [`ArtifactStore::transition`] so every committed change produces exactly
//! one [`TransitionEvent`]. The core never deletes an artifact; retention
//! is an external concern.

use crate::events::{TransitionEvent, TransitionLog};
use anvil_action::status::validate_transition;
use anvil_action::{
    ActionDescriptor, ActionId, ActionStatus, Artifact, ArtifactId, MessageId, StatusError,
};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;

/// Registry lookup and mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No artifact under this id (or the message id does not match).
    #[error("artifact {artifact_id} not found")]
    NotFound {
        /// The missing artifact id.
        artifact_id: ArtifactId,
    },

    /// The artifact exists but has no such action.
    #[error("artifact {artifact_id} has no action {action_id}")]
    UnknownAction {
        /// The owning artifact id.
        artifact_id: ArtifactId,
        /// The missing action id.
        action_id: ActionId,
    },

    /// Rejected status transition; stored status unchanged.
    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Shared store of artifacts plus the transition event log.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: DashMap<ArtifactId, Artifact>,
    log: TransitionLog,
}

impl ArtifactStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update an artifact.
    ///
    /// First sight of an id creates the artifact; re-sending an existing id
    /// merges action sets by id: replaced actions take the new descriptor
    /// (back in `Pending`), actions absent from the new payload are
    /// preserved. Concurrent upserts of the same id are serialized by the
    /// map's per-key locking, whole-artifact last-writer-wins.
    pub fn upsert(&self, artifact: Artifact) {
        match self.artifacts.entry(artifact.id.clone()) {
            dashmap::Entry::Occupied(mut existing) => {
                tracing::debug!(artifact = %artifact.id, "merging artifact revision");
                existing.get_mut().merge_revision(artifact);
            }
            dashmap::Entry::Vacant(slot) => {
                tracing::debug!(artifact = %artifact.id, "registering artifact");
                slot.insert(artifact);
            }
        }
    }

    /// Fetch an artifact by message and artifact id.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when the id is unknown or belongs to a
    /// different message.
    pub fn get(
        &self,
        message_id: &MessageId,
        artifact_id: &ArtifactId,
    ) -> Result<Artifact, StoreError> {
        self.artifacts
            .get(artifact_id)
            .filter(|artifact| &artifact.message_id == message_id)
            .map(|artifact| artifact.clone())
            .ok_or_else(|| StoreError::NotFound {
                artifact_id: artifact_id.clone(),
            })
    }

    /// Current snapshot of an artifact regardless of message.
    #[must_use]
    pub fn snapshot(&self, artifact_id: &ArtifactId) -> Option<Artifact> {
        self.artifacts.get(artifact_id).map(|a| a.clone())
    }

    /// Actions of an artifact in stream order.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for unknown artifacts.
    pub fn list_actions(
        &self,
        artifact_id: &ArtifactId,
    ) -> Result<Vec<ActionDescriptor>, StoreError> {
        let artifact = self
            .artifacts
            .get(artifact_id)
            .ok_or_else(|| StoreError::NotFound {
                artifact_id: artifact_id.clone(),
            })?;
        Ok(artifact.actions_in_order().cloned().collect())
    }

    /// One action's current descriptor.
    ///
    /// # Errors
    /// [`StoreError`] when artifact or action is unknown.
    pub fn action(
        &self,
        artifact_id: &ArtifactId,
        action_id: &ActionId,
    ) -> Result<ActionDescriptor, StoreError> {
        let artifact = self
            .artifacts
            .get(artifact_id)
            .ok_or_else(|| StoreError::NotFound {
                artifact_id: artifact_id.clone(),
            })?;
        artifact
            .action(action_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                artifact_id: artifact_id.clone(),
                action_id: action_id.clone(),
            })
    }

    /// One action's current status.
    ///
    /// # Errors
    /// [`StoreError`] when artifact or action is unknown.
    pub fn status(
        &self,
        artifact_id: &ArtifactId,
        action_id: &ActionId,
    ) -> Result<ActionStatus, StoreError> {
        Ok(self.action(artifact_id, action_id)?.status)
    }

    /// Commit a status transition and emit its event.
    ///
    /// # Errors
    /// [`StoreError::Status`] for transitions outside the table, leaving
    /// the stored status unchanged; [`StoreError`] lookup variants for
    /// unknown ids.
    pub fn transition(
        &self,
        artifact_id: &ArtifactId,
        action_id: &ActionId,
        to: ActionStatus,
    ) -> Result<TransitionEvent, StoreError> {
        let mut artifact =
            self.artifacts
                .get_mut(artifact_id)
                .ok_or_else(|| StoreError::NotFound {
                    artifact_id: artifact_id.clone(),
                })?;
        let action =
            artifact
                .actions
                .get_mut(action_id)
                .ok_or_else(|| StoreError::UnknownAction {
                    artifact_id: artifact_id.clone(),
                    action_id: action_id.clone(),
                })?;

        let from = action.status;
        validate_transition(from, to)?;
        action.status = to;

        let event = TransitionEvent {
            artifact_id: artifact_id.clone(),
            action_id: action_id.clone(),
            from,
            to,
            at: Utc::now(),
        };
        tracing::debug!(artifact = %artifact_id, action = %action_id, %from, %to, "status transition");
        self.log.append(event.clone());
        Ok(event)
    }

    /// Mark every `Pending` or `Running` action of an artifact `Aborted`.
    ///
    /// Already-terminal actions are untouched; committed side effects are
    /// not rolled back.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for unknown artifacts.
    pub fn abort_unfinished(&self, artifact_id: &ArtifactId) -> Result<(), StoreError> {
        let unfinished: Vec<ActionId> = {
            let artifact =
                self.artifacts
                    .get(artifact_id)
                    .ok_or_else(|| StoreError::NotFound {
                        artifact_id: artifact_id.clone(),
                    })?;
            artifact
                .actions_in_order()
                .filter(|a| matches!(a.status, ActionStatus::Pending | ActionStatus::Running))
                .map(|a| a.id.clone())
                .collect()
        };
        for action_id in unfinished {
            self.transition(artifact_id, &action_id, ActionStatus::Aborted)?;
        }
        Ok(())
    }

    /// Re-issue a terminal action as `Pending` for replay.
    ///
    /// The action keeps its identity and prior content unless a replacement
    /// descriptor was upserted.
    ///
    /// # Errors
    /// [`StoreError::Status`] when the action is not in a terminal state.
    pub fn reissue(
        &self,
        artifact_id: &ArtifactId,
        action_id: &ActionId,
    ) -> Result<TransitionEvent, StoreError> {
        self.transition(artifact_id, action_id, ActionStatus::Pending)
    }

    /// All transition events committed so far.
    #[must_use]
    pub fn events(&self) -> Vec<TransitionEvent> {
        self.log.events()
    }

    /// Subscribe to future transition events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.log.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_action::ActionPayload;

    fn shell(id: &str, command: &str) -> ActionDescriptor {
        ActionDescriptor::new(
            id.into(),
            ActionPayload::Shell {
                command: command.to_string(),
            },
            None,
        )
    }

    fn seed(store: &ArtifactStore) -> ArtifactId {
        let mut artifact = Artifact::new("art", "demo", "msg-1");
        artifact.upsert_action(shell("a", "one"));
        artifact.upsert_action(shell("b", "two"));
        artifact.upsert_action(shell("c", "three"));
        store.upsert(artifact);
        ArtifactId::from("art")
    }

    #[test]
    fn get_requires_matching_message() {
        let store = ArtifactStore::new();
        let id = seed(&store);
        assert!(store.get(&"msg-1".into(), &id).is_ok());
        assert_eq!(
            store.get(&"msg-2".into(), &id),
            Err(StoreError::NotFound {
                artifact_id: id.clone()
            })
        );
    }

    #[test]
    fn upsert_merges_instead_of_replacing() {
        let store = ArtifactStore::new();
        let id = seed(&store);

        // Second revision omits "c" entirely.
        let mut revision = Artifact::new("art", "demo v2", "msg-2");
        revision.upsert_action(shell("a", "one v2"));
        revision.upsert_action(shell("b", "two v2"));
        store.upsert(revision);

        let actions = store.list_actions(&id).unwrap();
        let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(matches!(
            &actions[0].payload,
            ActionPayload::Shell { command } if command == "one v2"
        ));
    }

    #[test]
    fn transition_commits_and_logs() {
        let store = ArtifactStore::new();
        let id = seed(&store);
        store
            .transition(&id, &"a".into(), ActionStatus::Running)
            .unwrap();
        assert_eq!(store.status(&id, &"a".into()).unwrap(), ActionStatus::Running);

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from, ActionStatus::Pending);
        assert_eq!(events[0].to, ActionStatus::Running);
    }

    #[test]
    fn illegal_transition_leaves_status_and_log_untouched() {
        let store = ArtifactStore::new();
        let id = seed(&store);
        let err = store
            .transition(&id, &"a".into(), ActionStatus::Complete)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Status(StatusError::IllegalTransition {
                from: ActionStatus::Pending,
                to: ActionStatus::Complete,
            })
        );
        assert_eq!(store.status(&id, &"a".into()).unwrap(), ActionStatus::Pending);
        assert!(store.events().is_empty());
    }

    #[test]
    fn abort_unfinished_spares_completed_actions() {
        let store = ArtifactStore::new();
        let id = seed(&store);
        store.transition(&id, &"a".into(), ActionStatus::Running).unwrap();
        store.transition(&id, &"a".into(), ActionStatus::Complete).unwrap();
        store.transition(&id, &"b".into(), ActionStatus::Running).unwrap();

        store.abort_unfinished(&id).unwrap();

        assert_eq!(store.status(&id, &"a".into()).unwrap(), ActionStatus::Complete);
        assert_eq!(store.status(&id, &"b".into()).unwrap(), ActionStatus::Aborted);
        assert_eq!(store.status(&id, &"c".into()).unwrap(), ActionStatus::Aborted);
    }

    #[test]
    fn reissue_returns_terminal_action_to_pending() {
        let store = ArtifactStore::new();
        let id = seed(&store);
        store.transition(&id, &"a".into(), ActionStatus::Running).unwrap();
        store.transition(&id, &"a".into(), ActionStatus::Failed).unwrap();

        store.reissue(&id, &"a".into()).unwrap();
        assert_eq!(store.status(&id, &"a".into()).unwrap(), ActionStatus::Pending);

        // Content survived the round trip.
        let action = store.action(&id, &"a".into()).unwrap();
        assert!(matches!(&action.payload, ActionPayload::Shell { command } if command == "one"));
    }
}
