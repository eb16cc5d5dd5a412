//! Artifact bundles

use crate::descriptor::ActionDescriptor;
use crate::ids::{ActionId, ArtifactId, MessageId};
use indexmap::IndexMap;

/// A named, identified bundle of actions produced for one upstream message.
///
/// Insertion order of `actions` is preserved and significant: it drives the
/// implicit stream-order dependency during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Stable across revisions; re-sending the same id means "update".
    pub id: ArtifactId,
    /// Human-readable label, no effect on execution.
    pub title: String,
    /// Lookup key back to the originating message, not an ownership edge.
    pub message_id: MessageId,
    /// Actions keyed by id, in stream order.
    pub actions: IndexMap<ActionId, ActionDescriptor>,
}

impl Artifact {
    /// New empty artifact.
    #[must_use]
    pub fn new(id: impl Into<ArtifactId>, title: impl Into<String>, message_id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message_id: message_id.into(),
            actions: IndexMap::new(),
        }
    }

    /// Insert or replace one action by id.
    ///
    /// Replacing keeps the action's original stream position, so a revision
    /// that re-sends an action does not reorder the implicit dependencies of
    /// its neighbors.
    pub fn upsert_action(&mut self, action: ActionDescriptor) {
        self.actions.insert(action.id.clone(), action);
    }

    /// Look up one action.
    #[must_use]
    pub fn action(&self, id: &ActionId) -> Option<&ActionDescriptor> {
        self.actions.get(id)
    }

    /// Actions in stream order.
    pub fn actions_in_order(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.values()
    }

    /// Merge a revision of the same artifact into this one.
    ///
    /// Replace semantics per action, not per artifact: actions present in
    /// `revision` overwrite their previous descriptor (keeping stream
    /// position), actions absent from it are preserved. Title and message id
    /// follow the newest revision.
    pub fn merge_revision(&mut self, revision: Artifact) {
        debug_assert_eq!(self.id, revision.id);
        self.title = revision.title;
        self.message_id = revision.message_id;
        for (id, action) in revision.actions {
            self.actions.insert(id, action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ActionPayload;
    use crate::status::ActionStatus;
    use pretty_assertions::assert_eq;

    fn shell(id: &str, command: &str) -> ActionDescriptor {
        ActionDescriptor::new(
            id.into(),
            ActionPayload::Shell { command: command.to_string() },
            None,
        )
    }

    #[test]
    fn upsert_keeps_stream_position() {
        let mut artifact = Artifact::new("art", "demo", "msg-1");
        artifact.upsert_action(shell("a", "one"));
        artifact.upsert_action(shell("b", "two"));
        artifact.upsert_action(shell("a", "one again"));

        let order: Vec<&str> = artifact.actions_in_order().map(|a| a.id.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn merge_preserves_actions_absent_from_revision() {
        let mut artifact = Artifact::new("art", "demo", "msg-1");
        artifact.upsert_action(shell("a", "one"));
        artifact.upsert_action(shell("c", "three"));
        if let Some(action) = artifact.actions.get_mut(&ActionId::from("a")) {
            action.status = ActionStatus::Complete;
        }

        let mut revision = Artifact::new("art", "demo v2", "msg-2");
        revision.upsert_action(shell("a", "one updated"));

        artifact.merge_revision(revision);

        assert_eq!(artifact.title, "demo v2");
        assert_eq!(artifact.message_id, MessageId::from("msg-2"));
        // Replaced action takes the new descriptor (and resets to pending).
        let a = artifact.action(&"a".into()).unwrap();
        assert_eq!(a.status, ActionStatus::Pending);
        assert!(matches!(&a.payload, ActionPayload::Shell { command } if command == "one updated"));
        // Action omitted from the revision is still there.
        assert!(artifact.action(&"c".into()).is_some());
    }
}
