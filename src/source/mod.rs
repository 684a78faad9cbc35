//! Source fetching - local mirrors and clean checkouts
//!
//! The version-control system is used as a black box behind
//! [`SourceFetcher`]; [`GitFetcher`] drives the `git` CLI.

pub mod git;
pub mod secrets;

use crate::core::WorkspaceLayout;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use git::GitFetcher;
pub use secrets::Secrets;

/// Error types for source operations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("git {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("branch '{0}' not found in mirror")]
    UnknownBranch(String),

    #[error("failed to prepare checkout directory: {0}")]
    Wipe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A commit resolved from a branch head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Commit hash
    pub id: String,

    /// Author e-mail, for logging
    pub author_email: String,

    /// Author timestamp, for logging
    pub authored_at: DateTime<FixedOffset>,
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.id, self.author_email, self.authored_at.to_rfc3339())
    }
}

/// A local mirror of a remote repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorHandle {
    /// Remote URL
    pub url: String,

    /// Mirror directory
    pub path: PathBuf,
}

/// Trait for source fetching - allows for different implementations
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Clone the mirror if absent, then fetch
    async fn ensure_mirror(
        &self,
        url: &str,
        workspace: &WorkspaceLayout,
    ) -> Result<MirrorHandle, FetchError>;

    /// Resolve the head commit of `branch`
    async fn resolve_branch_head(
        &self,
        mirror: &MirrorHandle,
        branch: &str,
    ) -> Result<Revision, FetchError>;

    /// Replace `dest` with a clean checkout of `revision` on `branch`
    async fn extract_checkout(
        &self,
        mirror: &MirrorHandle,
        branch: &str,
        revision: &Revision,
        dest: &Path,
    ) -> Result<(), FetchError>;
}
