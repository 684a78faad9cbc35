//! Docker CLI runtime

use crate::runtime::{
    streaming::{pump_lines, OutputSink},
    ContainerExit, ContainerRuntime, ContainerSpec, RuntimeError,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Label put on every image built for a step
pub const GENERATED_LABEL: &str = "autobuild_generated=true";

/// Runtime that drives the `docker` CLI as a subprocess
#[derive(Debug, Clone)]
pub struct DockerCli {
    /// Path to docker executable
    docker_path: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// Create a runtime using the given docker executable
    pub fn new(docker_path: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    /// Run a docker command to completion and return its trimmed stdout
    async fn docker(&self, args: &[String]) -> Result<String, RuntimeError> {
        let output = Command::new(&self.docker_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(format!("{}: {}", self.docker_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Engine(format!(
                "docker {} exited with code {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether the container ever got past starting
    async fn has_started(&self, id: &str) -> Result<bool, RuntimeError> {
        let started = self
            .docker(&[
                "inspect".to_string(),
                "--format".to_string(),
                "{{.State.StartedAt}}".to_string(),
                id.to_string(),
            ])
            .await?;
        Ok(!started.is_empty() && !started.starts_with(NEVER_STARTED))
    }

    /// Stream the container's output until it stops, then collect its exit code
    async fn attach_and_wait(
        &self,
        id: &str,
        sink: &dyn OutputSink,
    ) -> Result<ContainerExit, RuntimeError> {
        let mut child = Command::new(&self.docker_path)
            .args(["start", "--attach", id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {}", self.docker_path, e)))?;

        let output = pump_lines(child.stdout.take(), child.stderr.take(), sink).await;
        let status = child.wait().await?;
        if !status.success() && !self.has_started(id).await? {
            return Err(start_error(id, status.code(), &output));
        }

        let code = self.docker(&["wait".to_string(), id.to_string()]).await?;
        let status_code = code
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse::<i64>()
            .map_err(|_| RuntimeError::Engine(format!("unexpected wait output: {}", code)))?;

        Ok(ContainerExit {
            status_code,
            output,
        })
    }
}

/// Lines of output kept in a start failure
const ERROR_TAIL_LINES: usize = 5;

/// `StartedAt` of a container that never ran
const NEVER_STARTED: &str = "0001-01-01";

/// `docker start --attach` failed before the container ran
///
/// The attach client also exits non-zero when the container does, so this
/// is only used once the container is known not to have started.
fn start_error(id: &str, code: Option<i32>, output: &str) -> RuntimeError {
    let lines: Vec<&str> = output.lines().collect();
    let tail = lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..].join("\n");
    RuntimeError::Engine(format!(
        "docker start of {} exited with code {}: {}",
        id,
        code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
        tail
    ))
}

/// Arguments for `docker create`
pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    if spec.host_network {
        args.extend(["--network".to_string(), "host".to_string()]);
    }
    args.extend(["-w".to_string(), spec.working_dir.clone()]);
    for (key, value) in &spec.env {
        args.extend(["-e".to_string(), format!("{}={}", key, value)]);
    }
    for mount in &spec.mounts {
        args.extend([
            "-v".to_string(),
            format!("{}:{}", mount.host.display(), mount.container),
        ]);
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// A created container; removed explicitly, or on drop as a fallback
struct ContainerHandle {
    docker_path: String,
    id: String,
    removed: bool,
}

impl ContainerHandle {
    async fn remove(mut self) -> Result<(), RuntimeError> {
        self.removed = true;
        let status = Command::new(&self.docker_path)
            .args(["rm", "-f", &self.id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(RuntimeError::Engine(format!(
                "failed to remove container {}",
                self.id
            )));
        }
        Ok(())
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        warn!("Removing container {} after interrupted run", self.id);
        let spawned = std::process::Command::new(&self.docker_path)
            .args(["rm", "-f", &self.id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            warn!("Failed to remove container {}: {}", self.id, e);
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(
        &self,
        context: &Path,
        tag: &str,
        sink: &dyn OutputSink,
    ) -> Result<String, RuntimeError> {
        debug!("Building image {} from {}", tag, context.display());

        let mut child = Command::new(&self.docker_path)
            .arg("build")
            .args(["--label", GENERATED_LABEL, "-t", tag])
            .arg(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Spawn(format!("{}: {}", self.docker_path, e)))?;

        let output = pump_lines(child.stdout.take(), child.stderr.take(), sink).await;
        let status = child.wait().await?;
        if !status.success() {
            return Err(RuntimeError::ImageBuild(format!(
                "docker build of {} exited with code {}: {}",
                context.display(),
                status.code().unwrap_or(-1),
                output.lines().last().unwrap_or_default()
            )));
        }

        Ok(tag.to_string())
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        sink: &dyn OutputSink,
    ) -> Result<ContainerExit, RuntimeError> {
        let id = self.docker(&create_args(spec)).await?;
        debug!("Created container {} from {}", id, spec.image);

        let handle = ContainerHandle {
            docker_path: self.docker_path.clone(),
            id,
            removed: false,
        };

        let result = self.attach_and_wait(&handle.id, sink).await;

        let id = handle.id.clone();
        if let Err(e) = handle.remove().await {
            warn!("Container {} was not removed: {}", id, e);
        }

        result
    }
}
