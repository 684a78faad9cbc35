//! autobuild - a local CI orchestrator
//!
//! Pipelines are declared per project in YAML. Each run fetches the branch
//! head, skips revisions already built or already failed, takes a
//! per-project lock and runs every step in its own container.

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runtime;
pub mod source;
pub mod trigger;

// Re-export commonly used types
pub use crate::core::{BuildReport, Project, RunOutcome, Settings, SkipReason, Step, WorkspaceLayout};
pub use execution::{BuildRunner, PipelineExecutor};
pub use persistence::{BuildLock, RevisionStateStore};
pub use runtime::{ContainerRuntime, DockerCli};
pub use source::{GitFetcher, SourceFetcher};
pub use trigger::{Dispatcher, TriggerWatcher};
