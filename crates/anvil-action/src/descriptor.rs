//! Typed action descriptors

use crate::ids::ActionId;
use crate::path::WorkspacePath;
use crate::status::ActionStatus;
use anvil_patch::Patch;

/// Body of a file action, disambiguated by the wire envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Full replacement body.
    Full(String),
    /// Diff against the current file content.
    Diff(Patch),
}

/// What an action does; the set is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    /// Write a file inside the working directory.
    File {
        /// Workspace-relative target path.
        path: WorkspacePath,
        /// Replacement body or diff payload.
        content: FileContent,
    },
    /// Run a shell command.
    Shell {
        /// Command text; sequencing of chained commands inside it is the
        /// shell collaborator's concern.
        command: String,
    },
}

impl ActionPayload {
    /// Target path for file actions.
    #[must_use]
    pub fn file_path(&self) -> Option<&WorkspacePath> {
        match self {
            ActionPayload::File { path, .. } => Some(path),
            ActionPayload::Shell { .. } => None,
        }
    }

    /// Whether this is a shell action.
    #[must_use]
    pub fn is_shell(&self) -> bool {
        matches!(self, ActionPayload::Shell { .. })
    }
}

/// One unit of work decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Unique within the artifact, stable across re-runs.
    pub id: ActionId,
    /// File write or shell command.
    pub payload: ActionPayload,
    /// Declared dependency set. `None` means the implicit stream-order
    /// dependency on the immediately preceding action applies; an explicit
    /// set, even an empty one, overrides it.
    pub dependencies: Option<Vec<ActionId>>,
    /// Current lifecycle state.
    pub status: ActionStatus,
}

impl ActionDescriptor {
    /// New descriptor in the initial `Pending` state.
    #[must_use]
    pub fn new(id: ActionId, payload: ActionPayload, dependencies: Option<Vec<ActionId>>) -> Self {
        Self {
            id,
            payload,
            dependencies,
            status: ActionStatus::Pending,
        }
    }

    /// Declared dependencies, empty when the implicit ordering applies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &[ActionId] {
        self.dependencies.as_deref().unwrap_or(&[])
    }
}
