//! Incremental action-stream decoder
//!
//! The wire format is a sequence of JSON records, one per action:
//!
//! ```json
//! {"id":"a","type":"file","filePath":"package.json","content":{"full":"…"}}
//! {"id":"b","type":"shell","content":"npm install","dependencies":["a"]}
//! {"id":"c","type":"file","filePath":"src/a.ts","content":{"diff":"@@ -1,3 +1,4 @@\n…"}}
//! ```
//!
//! [`ActionDecoder`] decodes lazily so execution can begin while the producer
//! is still emitting; [`decode_all`] buffers the completed stream and
//! additionally rejects dependencies that never resolve. Unknown fields are
//! ignored for forward compatibility; unknown `type` values fail decode.

use crate::descriptor::{ActionDescriptor, ActionPayload, FileContent};
use crate::ids::ActionId;
use crate::path::{PathError, WorkspacePath};
use anvil_patch::{Patch, PatchError};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io;

/// Fatal decode failures; the whole artifact's decode pass aborts.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Malformed JSON or a record not matching the envelope.
    #[error("malformed action record: {0}")]
    Parse(#[from] serde_json::Error),

    /// `type` outside the closed `file | shell` set.
    #[error("action {id:?} has unknown type {kind:?}")]
    UnknownKind {
        /// Offending action id.
        id: String,
        /// The unrecognized type value.
        kind: String,
    },

    /// File action without a `filePath`.
    #[error("file action {id:?} is missing filePath")]
    MissingFilePath {
        /// Offending action id.
        id: String,
    },

    /// Content envelope does not match the action type.
    #[error("action {id:?} content does not match its type")]
    BadContentEnvelope {
        /// Offending action id.
        id: String,
    },

    /// Shell action with empty command text.
    #[error("shell action {id:?} has empty content")]
    EmptyCommand {
        /// Offending action id.
        id: String,
    },

    /// File path rejected by [`WorkspacePath`].
    #[error("file action {id:?} has invalid path")]
    InvalidPath {
        /// Offending action id.
        id: String,
        /// Why the path was rejected.
        #[source]
        source: PathError,
    },

    /// Diff payload rejected at decode time (parse error or overlap).
    #[error("file action {id:?} carries a bad diff payload")]
    BadDiff {
        /// Offending action id.
        id: String,
        /// Underlying patch error.
        #[source]
        source: PatchError,
    },

    /// Two actions with the same id in one artifact.
    #[error("duplicate action id {id:?}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// A declared dependency naming an id not present in the stream.
    #[error("action {id:?} depends on unknown action {dependency:?}")]
    UnknownDependency {
        /// Action declaring the dependency.
        id: String,
        /// The dangling dependency id.
        dependency: String,
    },
}

/// Non-fatal decode findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    /// Two pending file actions target the same path; last write wins.
    DuplicatePath {
        /// The shared target path.
        path: WorkspacePath,
        /// Action that targeted the path first.
        first: ActionId,
        /// Action that targets it again.
        second: ActionId,
    },
}

#[derive(Debug, Deserialize)]
struct RawAction {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "filePath")]
    file_path: Option<String>,
    content: RawContent,
    dependencies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Command(String),
    File(RawFileContent),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawFileContent {
    Full(String),
    Diff(String),
}

/// Lazy decoder over an incrementally arriving record stream.
///
/// Decoding the same completed stream twice yields identical sequences.
pub struct ActionDecoder<R: io::Read> {
    records: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<R>, RawAction>,
    seen_ids: HashSet<ActionId>,
    seen_paths: HashMap<WorkspacePath, ActionId>,
    warnings: Vec<DecodeWarning>,
}

impl<R: io::Read> ActionDecoder<R> {
    /// Decode records from `reader` as they arrive.
    pub fn new(reader: R) -> Self {
        Self {
            records: serde_json::Deserializer::from_reader(reader).into_iter(),
            seen_ids: HashSet::new(),
            seen_paths: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Warnings accumulated so far.
    #[must_use]
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// Action ids decoded so far.
    #[must_use]
    pub fn seen_ids(&self) -> &HashSet<ActionId> {
        &self.seen_ids
    }

    fn validate(&mut self, raw: RawAction) -> Result<ActionDescriptor, DecodeError> {
        let id = ActionId::from(raw.id.as_str());
        if !self.seen_ids.insert(id.clone()) {
            return Err(DecodeError::DuplicateId { id: raw.id });
        }

        let payload = match raw.kind.as_str() {
            "file" => {
                let file_path = raw.file_path.ok_or(DecodeError::MissingFilePath {
                    id: raw.id.clone(),
                })?;
                let path =
                    WorkspacePath::new(&file_path).map_err(|source| DecodeError::InvalidPath {
                        id: raw.id.clone(),
                        source,
                    })?;
                let content = match raw.content {
                    RawContent::File(RawFileContent::Full(body)) => FileContent::Full(body),
                    RawContent::File(RawFileContent::Diff(text)) => FileContent::Diff(
                        Patch::parse(&text).map_err(|source| DecodeError::BadDiff {
                            id: raw.id.clone(),
                            source,
                        })?,
                    ),
                    RawContent::Command(_) => {
                        return Err(DecodeError::BadContentEnvelope { id: raw.id });
                    }
                };

                if let Some(first) = self.seen_paths.insert(path.clone(), id.clone()) {
                    tracing::warn!(
                        path = %path,
                        first = %first,
                        second = %id,
                        "duplicate file path in stream; last write wins"
                    );
                    self.warnings.push(DecodeWarning::DuplicatePath {
                        path: path.clone(),
                        first,
                        second: id.clone(),
                    });
                }

                ActionPayload::File { path, content }
            }
            "shell" => {
                let RawContent::Command(command) = raw.content else {
                    return Err(DecodeError::BadContentEnvelope { id: raw.id });
                };
                if command.trim().is_empty() {
                    return Err(DecodeError::EmptyCommand { id: raw.id });
                }
                ActionPayload::Shell { command }
            }
            other => {
                return Err(DecodeError::UnknownKind {
                    id: raw.id,
                    kind: other.to_string(),
                });
            }
        };

        let dependencies = raw
            .dependencies
            .map(|deps| deps.into_iter().map(ActionId::from).collect());

        Ok(ActionDescriptor::new(id, payload, dependencies))
    }
}

impl<R: io::Read> Iterator for ActionDecoder<R> {
    type Item = Result<ActionDescriptor, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(DecodeError::Parse(err))),
        };
        Some(self.validate(record))
    }
}

/// Decode a completed stream into an ordered descriptor sequence.
///
/// On top of the per-record validation this resolves forward references:
/// every declared dependency must name an id present somewhere in the
/// stream.
///
/// # Errors
/// The first [`DecodeError`] encountered; no partial sequence is returned.
pub fn decode_all<R: io::Read>(reader: R) -> Result<Vec<ActionDescriptor>, DecodeError> {
    let mut decoder = ActionDecoder::new(reader);
    let mut actions = Vec::new();
    for action in decoder.by_ref() {
        actions.push(action?);
    }

    for action in &actions {
        for dependency in action.declared_dependencies() {
            if !decoder.seen_ids.contains(dependency) {
                return Err(DecodeError::UnknownDependency {
                    id: action.id.as_str().to_string(),
                    dependency: dependency.as_str().to_string(),
                });
            }
        }
    }

    tracing::debug!(actions = actions.len(), "decoded action stream");
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ActionStatus;
    use pretty_assertions::assert_eq;

    const STREAM: &str = r#"
        {"id":"a","type":"file","filePath":"package.json","content":{"full":"{}"}}
        {"id":"b","type":"shell","content":"npm install","dependencies":["a"]}
        {"id":"c","type":"file","filePath":"src/a.ts","content":{"diff":"@@ -1,1 +1,1 @@\n-old\n+new"}}
    "#;

    #[test]
    fn decodes_ordered_stream() {
        let actions = decode_all(STREAM.as_bytes()).unwrap();
        assert_eq!(actions.len(), 3);

        assert_eq!(actions[0].id, ActionId::from("a"));
        assert_eq!(actions[0].status, ActionStatus::Pending);
        assert!(matches!(
            &actions[0].payload,
            ActionPayload::File { content: FileContent::Full(body), .. } if body == "{}"
        ));
        assert_eq!(actions[0].dependencies, None);

        assert_eq!(actions[1].dependencies, Some(vec![ActionId::from("a")]));
        assert!(matches!(&actions[2].payload, ActionPayload::File { content: FileContent::Diff(_), .. }));
    }

    #[test]
    fn decoding_twice_is_deterministic() {
        let first = decode_all(STREAM.as_bytes()).unwrap();
        let second = decode_all(STREAM.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn lazy_decoding_yields_actions_before_stream_end() {
        let mut decoder = ActionDecoder::new(STREAM.as_bytes());
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.id, ActionId::from("a"));
        // Two records still undrained at this point.
        assert_eq!(decoder.by_ref().count(), 2);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let stream = r#"{"id":"a","type":"shell","content":"ls","color":"teal","retries":7}"#;
        let actions = decode_all(stream.as_bytes()).unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn unknown_type_fails() {
        let stream = r#"{"id":"a","type":"docker","content":"build"}"#;
        let err = decode_all(stream.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind { kind, .. } if kind == "docker"));
    }

    #[test]
    fn empty_shell_command_fails() {
        let stream = r#"{"id":"a","type":"shell","content":"  "}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::EmptyCommand { id }) if id == "a"
        ));
    }

    #[test]
    fn escaping_file_path_fails() {
        let stream = r#"{"id":"a","type":"file","filePath":"../etc/passwd","content":{"full":"x"}}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::InvalidPath { .. })
        ));
    }

    #[test]
    fn missing_file_path_fails() {
        let stream = r#"{"id":"a","type":"file","content":{"full":"x"}}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::MissingFilePath { .. })
        ));
    }

    #[test]
    fn shell_envelope_on_file_action_fails() {
        let stream = r#"{"id":"a","type":"file","filePath":"x.txt","content":"plain"}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::BadContentEnvelope { .. })
        ));
    }

    #[test]
    fn overlapping_diff_is_a_decode_error() {
        let stream = r#"{"id":"a","type":"file","filePath":"x.txt","content":{"diff":"@@ -1,2 +1,2 @@\n a\n-b\n+B\n@@ -2,1 +2,1 @@\n-b\n+c"}}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::BadDiff { source: PatchError::OverlappingHunks { .. }, .. })
        ));
    }

    #[test]
    fn duplicate_id_fails() {
        let stream = r#"
            {"id":"a","type":"shell","content":"ls"}
            {"id":"a","type":"shell","content":"pwd"}
        "#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::DuplicateId { id }) if id == "a"
        ));
    }

    #[test]
    fn forward_references_resolve() {
        let stream = r#"
            {"id":"a","type":"shell","content":"ls","dependencies":["b"]}
            {"id":"b","type":"shell","content":"pwd","dependencies":[]}
        "#;
        assert!(decode_all(stream.as_bytes()).is_ok());
    }

    #[test]
    fn dangling_dependency_fails() {
        let stream = r#"{"id":"a","type":"shell","content":"ls","dependencies":["ghost"]}"#;
        assert!(matches!(
            decode_all(stream.as_bytes()),
            Err(DecodeError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn duplicate_path_is_a_warning_not_an_error() {
        let stream = r#"
            {"id":"a","type":"file","filePath":"x.txt","content":{"full":"one"}}
            {"id":"b","type":"file","filePath":"./x.txt","content":{"full":"two"}}
        "#;
        let mut decoder = ActionDecoder::new(stream.as_bytes());
        let actions: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            decoder.warnings(),
            &[DecodeWarning::DuplicatePath {
                path: WorkspacePath::new("x.txt").unwrap(),
                first: ActionId::from("a"),
                second: ActionId::from("b"),
            }]
        );
    }
}
