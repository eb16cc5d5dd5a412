//! Action execution engine
//!
//! Takes decoded [`anvil_action::Artifact`] bundles and drives them against a
//! target workspace: the resolver turns declared and implicit dependencies
//! into an execution plan of ready groups, the engine runs those groups
//! through the status state machine via injected file-system and shell
//! collaborators, and the registry keeps every artifact addressable for
//! update and replay. Each committed status change is published as a
//! [`TransitionEvent`].

pub mod cancel;
pub mod collaborator;
pub mod engine;
pub mod error;
pub mod events;
pub mod local;
pub mod locks;
pub mod registry;
pub mod resolve;

pub use cancel::CancelToken;
pub use collaborator::{ExitOutcome, FsError, ShellError, ShellRunner, WorkspaceFs};
pub use engine::{EngineConfig, ExecFailure, ExecutionEngine, ExecutionReport, RetryPolicy};
pub use error::EngineError;
pub use events::{TransitionEvent, TransitionLog};
pub use local::{LocalWorkspaceFs, SystemShell};
pub use locks::PathLocks;
pub use registry::{ArtifactStore, StoreError};
pub use resolve::{DepKind, ExecutionPlan, ResolveError};
