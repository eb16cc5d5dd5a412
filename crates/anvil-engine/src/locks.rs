//! Per-path write serialization
//!
//! The workspace file system is shared by every concurrently running file
//! action, across artifacts. [`PathLocks`] hands out one async mutex per
//! normalized target path; the engine holds it for the duration of
//! read-baseline + reconcile + write so concurrent writers cannot lose
//! updates. Share one instance across engines that target the same
//! workspace.

use anvil_action::WorkspacePath;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed set of per-path async mutexes.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<DashMap<WorkspacePath, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one path, creating it on first use.
    pub async fn lock(&self, path: &WorkspacePath) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = PathLocks::new();
        let path = WorkspacePath::new("src/main.rs").unwrap();

        let guard = locks.lock(&path).await;
        let contender = {
            let locks = locks.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&path).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("lock should be released")
            .unwrap();
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let locks = PathLocks::new();
        let _a = locks.lock(&WorkspacePath::new("a.txt").unwrap()).await;
        let _b = locks.lock(&WorkspacePath::new("b.txt").unwrap()).await;
    }

    #[tokio::test]
    async fn normalized_spellings_share_a_lock() {
        let locks = PathLocks::new();
        let _guard = locks.lock(&WorkspacePath::new("src/./main.rs").unwrap()).await;
        let other = WorkspacePath::new("src/main.rs").unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), locks.lock(&other))
                .await
                .is_err()
        );
    }
}
