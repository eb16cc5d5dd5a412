//! Engine error taxonomy

use crate::registry::StoreError;
use crate::resolve::ResolveError;

/// Failures that abort an engine run before any action executes.
///
/// Per-action execution failures do not surface here; they are recorded in
/// the [`ExecutionReport`](crate::engine::ExecutionReport) so sibling
/// actions can still run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Registry lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The artifact's dependency graph could not be planned.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
