//! Container runtime - isolated execution of build steps
//!
//! The container engine is a black box behind [`ContainerRuntime`]:
//! run a command inside an isolated filesystem and network environment,
//! return its exit status and combined output. [`DockerCli`] drives the
//! `docker` CLI.

pub mod docker;
pub mod streaming;

use crate::core::workspace::SOURCE_MOUNT;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use docker::DockerCli;
pub use streaming::{NoopSink, OutputSink};

/// Removes the contents of the directory mounted at the source mount point,
/// leaving the directory itself in place
pub const WIPE_SCRIPT: &str = "find /opt/workspace/ -mindepth 1 -name . -o -prune -exec rm -rf -- {} +";

/// Error types for container operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to start container engine: {0}")]
    Spawn(String),

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("image build failed: {0}")]
    ImageBuild(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A host directory bound into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

impl Mount {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }
}

/// Everything needed to create one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference
    pub image: String,

    /// Command and arguments
    pub command: Vec<String>,

    /// Environment variables
    pub env: BTreeMap<String, String>,

    /// Bind mounts, in order
    pub mounts: Vec<Mount>,

    /// Working directory inside the container
    pub working_dir: String,

    /// Share the host network namespace
    pub host_network: bool,
}

impl ContainerSpec {
    /// Run `script` with `sh -ex` from the source mount
    pub fn shell(image: impl Into<String>, script: &str) -> Self {
        Self {
            image: image.into(),
            command: vec![
                "/bin/sh".to_string(),
                "-ex".to_string(),
                "-c".to_string(),
                "--".to_string(),
                script.to_string(),
            ],
            env: BTreeMap::new(),
            mounts: Vec::new(),
            working_dir: SOURCE_MOUNT.to_string(),
            host_network: true,
        }
    }

    /// Wipe the contents of `dir` from inside a container
    pub fn wipe(helper_image: impl Into<String>, dir: &Path) -> Self {
        Self {
            image: helper_image.into(),
            command: vec!["sh".to_string(), "-c".to_string(), WIPE_SCRIPT.to_string()],
            env: BTreeMap::new(),
            mounts: vec![Mount::new(dir, SOURCE_MOUNT)],
            working_dir: SOURCE_MOUNT.to_string(),
            host_network: false,
        }
    }
}

/// Exit status and combined output of a finished container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExit {
    pub status_code: i64,
    pub output: String,
}

impl ContainerExit {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

/// Trait for container execution - allows for different implementations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from `context` and tag it; returns the image reference
    async fn build_image(
        &self,
        context: &Path,
        tag: &str,
        sink: &dyn OutputSink,
    ) -> Result<String, RuntimeError>;

    /// Create a container, stream its output to `sink`, wait for it, remove it
    ///
    /// The container is removed on every exit path.
    async fn run(&self, spec: &ContainerSpec, sink: &dyn OutputSink)
        -> Result<ContainerExit, RuntimeError>;

    /// Remove the contents of `dir` from inside a container
    ///
    /// Trees written by containers may be owned by a UID the orchestrator
    /// cannot delete, so the wipe runs on the container side.
    async fn empty_dir(&self, dir: &Path, helper_image: &str) -> Result<(), RuntimeError> {
        let exit = self.run(&ContainerSpec::wipe(helper_image, dir), &NoopSink).await?;
        if !exit.success() {
            return Err(RuntimeError::Engine(format!(
                "wipe of {} exited with {}: {}",
                dir.display(),
                exit.status_code,
                exit.output.trim()
            )));
        }
        Ok(())
    }
}
