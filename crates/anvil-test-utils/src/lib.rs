//! Testing utilities for the Anvil workspace
//!
//! In-memory collaborators plus fixture builders for descriptors and
//! artifacts.

#![allow(missing_docs)]

use anvil_action::{
    ActionDescriptor, ActionId, ActionPayload, Artifact, FileContent, WorkspacePath,
};
use anvil_engine::cancel::CancelToken;
use anvil_engine::collaborator::{ExitOutcome, FsError, ShellError, ShellRunner, WorkspaceFs};
use anvil_patch::Patch;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// In-memory [`WorkspaceFs`]; clones share one file map.
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: Arc<DashMap<WorkspacePath, String>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate one file.
    pub fn seed(&self, path: &str, contents: &str) {
        self.files.insert(wpath(path), contents.to_string());
    }

    /// Current contents of one file, if written.
    pub fn contents(&self, path: &str) -> Option<String> {
        self.files.get(&wpath(path)).map(|entry| entry.clone())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[async_trait]
impl WorkspaceFs for MemoryFs {
    async fn read(&self, path: &WorkspacePath) -> Result<Option<String>, FsError> {
        Ok(self.files.get(path).map(|entry| entry.clone()))
    }

    async fn write(&self, path: &WorkspacePath, contents: &str) -> Result<(), FsError> {
        self.files.insert(path.clone(), contents.to_string());
        Ok(())
    }
}

/// Scripted [`ShellRunner`] that records execution order.
///
/// Unscripted commands succeed. A command scripted more than once yields its
/// outcomes in order, then falls back to success, which lets retry paths be
/// exercised. Commands registered with [`ScriptedShell::block_on`] park
/// until the cancel token fires and then report a cancelled outcome.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    outcomes: Mutex<HashMap<String, VecDeque<ExitOutcome>>>,
    blocking: Mutex<HashSet<String>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one outcome for a command.
    pub fn script(&self, command: &str, outcome: ExitOutcome) {
        self.outcomes
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Make a command wait for cancellation instead of finishing.
    pub fn block_on(&self, command: &str) {
        self.blocking.lock().insert(command.to_string());
    }

    /// Commands seen so far, in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl ShellRunner for ScriptedShell {
    async fn exec(&self, command: &str, cancel: &CancelToken) -> Result<ExitOutcome, ShellError> {
        self.executed.lock().push(command.to_string());
        if self.blocking.lock().contains(command) {
            cancel.cancelled().await;
            return Ok(ExitOutcome::Cancelled);
        }
        let outcome = self
            .outcomes
            .lock()
            .get_mut(command)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ExitOutcome::Exited(0));
        Ok(outcome)
    }
}

/// Install a test-friendly tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Parse a workspace path, panicking on fixtures that are simply wrong.
pub fn wpath(path: &str) -> WorkspacePath {
    WorkspacePath::new(path).unwrap()
}

/// File action carrying full contents.
pub fn file_full(id: &str, path: &str, contents: &str) -> ActionDescriptor {
    ActionDescriptor::new(
        id.into(),
        ActionPayload::File {
            path: wpath(path),
            content: FileContent::Full(contents.to_string()),
        },
        None,
    )
}

/// File action carrying a unified diff.
pub fn file_diff(id: &str, path: &str, diff: &str) -> ActionDescriptor {
    ActionDescriptor::new(
        id.into(),
        ActionPayload::File {
            path: wpath(path),
            content: FileContent::Diff(Patch::parse(diff).unwrap()),
        },
        None,
    )
}

/// Shell action.
pub fn shell(id: &str, command: &str) -> ActionDescriptor {
    ActionDescriptor::new(
        id.into(),
        ActionPayload::Shell {
            command: command.to_string(),
        },
        None,
    )
}

/// Override an action's declared dependency set.
pub fn with_deps(mut action: ActionDescriptor, deps: &[&str]) -> ActionDescriptor {
    action.dependencies = Some(deps.iter().map(|d| ActionId::from(*d)).collect());
    action
}

/// Artifact from a list of actions, in stream order.
pub fn artifact(id: &str, message_id: &str, actions: Vec<ActionDescriptor>) -> Artifact {
    let mut artifact = Artifact::new(id, format!("{id} artifact"), message_id);
    for action in actions {
        artifact.upsert_action(action);
    }
    artifact
}
