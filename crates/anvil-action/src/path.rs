//! Workspace-relative paths
//!
//! Every file action targets a path inside one declared working directory.
//! [`WorkspacePath`] validates and normalizes that path at decode time so the
//! execution layer never has to reason about escapes.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reasons a raw path is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty path, or a path that normalizes to nothing.
    #[error("empty file path")]
    Empty,

    /// Absolute path or drive/root prefix; paths must be workspace-relative.
    #[error("absolute path not allowed: {0:?}")]
    Absolute(String),

    /// `..` traversal that leaves the working directory.
    #[error("path escapes the working directory: {0:?}")]
    EscapesRoot(String),
}

/// A normalized path relative to the declared working directory.
///
/// Segments are joined with `/`; `.` segments and interior `..` segments are
/// collapsed during construction, so two spellings of the same target compare
/// equal (which also makes the per-path write locks effective).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspacePath(String);

impl WorkspacePath {
    /// Validate and normalize a raw path.
    ///
    /// # Errors
    /// [`PathError`] for empty, absolute or escaping paths.
    pub fn new(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.starts_with('/') || raw.starts_with('\\') || has_drive_prefix(raw) {
            return Err(PathError::Absolute(raw.to_string()));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot(raw.to_string()));
                    }
                }
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Self(segments.join("/")))
    }

    /// The normalized relative path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against a concrete working directory.
    #[must_use]
    pub fn under(&self, root: &Path) -> PathBuf {
        let mut full = root.to_path_buf();
        for segment in self.0.split('/') {
            full.push(segment);
        }
        full
    }
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

impl Display for WorkspacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspacePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkspacePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<WorkspacePath> for String {
    fn from(value: WorkspacePath) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_normalizes_relative_paths() {
        assert_eq!(WorkspacePath::new("src/main.rs").unwrap().as_str(), "src/main.rs");
        assert_eq!(WorkspacePath::new("./src//main.rs").unwrap().as_str(), "src/main.rs");
        assert_eq!(WorkspacePath::new("src/../pkg.json").unwrap().as_str(), "pkg.json");
        assert_eq!(WorkspacePath::new("a\\b").unwrap().as_str(), "a/b");
    }

    #[test]
    fn rejects_absolute_paths() {
        assert_eq!(
            WorkspacePath::new("/etc/passwd"),
            Err(PathError::Absolute("/etc/passwd".to_string()))
        );
        assert!(matches!(WorkspacePath::new("C:\\x"), Err(PathError::Absolute(_))));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(matches!(WorkspacePath::new("../x"), Err(PathError::EscapesRoot(_))));
        assert!(matches!(WorkspacePath::new("a/../../x"), Err(PathError::EscapesRoot(_))));
    }

    #[test]
    fn rejects_empty_paths() {
        assert_eq!(WorkspacePath::new(""), Err(PathError::Empty));
        assert_eq!(WorkspacePath::new("./."), Err(PathError::Empty));
    }

    #[test]
    fn equal_after_normalization() {
        assert_eq!(
            WorkspacePath::new("src/./lib.rs").unwrap(),
            WorkspacePath::new("src/lib.rs").unwrap()
        );
    }

    #[test]
    fn resolves_under_root() {
        let path = WorkspacePath::new("src/main.rs").unwrap();
        assert_eq!(path.under(Path::new("/work")), PathBuf::from("/work/src/main.rs"));
    }
}
