//! Local collaborators
//!
//! Concrete [`WorkspaceFs`] and [`ShellRunner`] implementations for a
//! workspace rooted in the local file system. Both are rooted at
//! construction and resolve every [`WorkspacePath`] against that root.

use crate::cancel::CancelToken;
use crate::collaborator::{ExitOutcome, FsError, ShellError, ShellRunner, WorkspaceFs};
use anvil_action::WorkspacePath;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// File access under a local root directory.
#[derive(Debug, Clone)]
pub struct LocalWorkspaceFs {
    root: PathBuf,
}

impl LocalWorkspaceFs {
    /// Workspace rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl WorkspaceFs for LocalWorkspaceFs {
    async fn read(&self, path: &WorkspacePath) -> Result<Option<String>, FsError> {
        match tokio::fs::read_to_string(path.under(&self.root)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::Io {
                path: path.clone(),
                source: err,
            }),
        }
    }

    async fn write(&self, path: &WorkspacePath, contents: &str) -> Result<(), FsError> {
        let target = path.under(&self.root);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| FsError::Io {
                    path: path.clone(),
                    source: err,
                })?;
        }
        tokio::fs::write(target, contents)
            .await
            .map_err(|err| FsError::Io {
                path: path.clone(),
                source: err,
            })
    }
}

/// Runs commands through `sh -c` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct SystemShell {
    workdir: PathBuf,
}

impl SystemShell {
    /// Shell rooted at `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ShellRunner for SystemShell {
    async fn exec(&self, command: &str, cancel: &CancelToken) -> Result<ExitOutcome, ShellError> {
        if cancel.is_cancelled() {
            return Ok(ExitOutcome::Cancelled);
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(ShellError::Spawn)?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ShellError::Spawn)?;
                // Code is absent when the process died to a signal.
                Ok(ExitOutcome::Exited(status.code().unwrap_or(-1)))
            }
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                Ok(ExitOutcome::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalWorkspaceFs::new(dir.path());
        let path = WorkspacePath::new("src/lib.rs").unwrap();
        assert_eq!(fs.read(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_creates_parents_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalWorkspaceFs::new(dir.path());
        let path = WorkspacePath::new("deep/nested/file.txt").unwrap();

        fs.write(&path, "hello\n").await.unwrap();
        assert_eq!(fs.read(&path).await.unwrap().as_deref(), Some("hello\n"));
    }

    #[tokio::test]
    async fn exit_codes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let shell = SystemShell::new(dir.path());
        let cancel = CancelToken::new();

        assert_eq!(
            shell.exec("true", &cancel).await.unwrap(),
            ExitOutcome::Exited(0)
        );
        assert_eq!(
            shell.exec("exit 7", &cancel).await.unwrap(),
            ExitOutcome::Exited(7)
        );
    }

    #[tokio::test]
    async fn cancellation_terminates_a_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let shell = SystemShell::new(dir.path());
        let cancel = CancelToken::new();

        let task = {
            let shell = shell.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { shell.exec("sleep 30", &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ExitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let shell = SystemShell::new(dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(
            shell.exec("true", &cancel).await.unwrap(),
            ExitOutcome::Cancelled
        );
    }
}
