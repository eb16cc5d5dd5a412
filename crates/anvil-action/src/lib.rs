//! Action data model, stream decoder and status state machine
//!
//! An upstream generator emits an ordered stream of action records (file
//! writes and shell commands) bundled into artifacts. This crate turns that
//! stream into typed [`ActionDescriptor`]s with validated fields, models the
//! [`Artifact`] bundle, and guards per-action lifecycle state behind the
//! transition table in [`status`].

pub mod artifact;
pub mod decode;
pub mod descriptor;
pub mod ids;
pub mod path;
pub mod status;

pub use artifact::Artifact;
pub use decode::{decode_all, ActionDecoder, DecodeError, DecodeWarning};
pub use descriptor::{ActionDescriptor, ActionPayload, FileContent};
pub use ids::{ActionId, ArtifactId, MessageId};
pub use path::{PathError, WorkspacePath};
pub use status::{ActionStatus, StatusError};
