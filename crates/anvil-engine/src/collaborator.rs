//! Execution substrate contracts
//!
//! The engine never touches the file system or spawns processes itself; it
//! talks to these two collaborators. Paths handed to [`WorkspaceFs`] are
//! always workspace-relative [`WorkspacePath`]s; resolving them against a
//! concrete root is the collaborator's job.

use crate::cancel::CancelToken;
use anvil_action::WorkspacePath;
use async_trait::async_trait;

/// File-system collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Underlying I/O failure on a workspace path.
    #[error("io error on {path}: {source}")]
    Io {
        /// The workspace-relative path involved.
        path: WorkspacePath,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Shell collaborator failures (distinct from a command exiting non-zero).
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The shell process could not be spawned or awaited.
    #[error("failed to run shell command: {0}")]
    Spawn(#[source] std::io::Error),
}

/// How a shell invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The command ran to completion with this exit code.
    Exited(i32),
    /// The command was terminated in response to the cancel token.
    Cancelled,
}

impl ExitOutcome {
    /// Whether this outcome counts as success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

/// Read/write access to the target workspace.
#[async_trait]
pub trait WorkspaceFs: Send + Sync {
    /// Read a file, `None` when absent.
    async fn read(&self, path: &WorkspacePath) -> Result<Option<String>, FsError>;

    /// Write a file, creating parent directories as needed.
    async fn write(&self, path: &WorkspacePath, contents: &str) -> Result<(), FsError>;
}

/// Shell command execution with cooperative cancellation.
///
/// Sequencing of chained commands inside one invocation (`a && b`) is the
/// command text's concern, opaque to the engine.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run one command to completion or cancellation.
    async fn exec(&self, command: &str, cancel: &CancelToken) -> Result<ExitOutcome, ShellError>;
}
