//! Git CLI source fetcher

use crate::core::WorkspaceLayout;
use crate::runtime::ContainerRuntime;
use crate::source::{FetchError, MirrorHandle, Revision, Secrets, SourceFetcher};
use async_trait::async_trait;
use chrono::DateTime;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Fetcher that drives the `git` executable
///
/// Checkouts are wiped through the container runtime, since files left by a
/// previous step may belong to a UID the orchestrator cannot remove.
pub struct GitFetcher {
    /// Path to git executable
    git_path: String,
    runtime: Arc<dyn ContainerRuntime>,
    helper_image: String,
    secrets: Secrets,
}

impl GitFetcher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        helper_image: impl Into<String>,
        secrets: Secrets,
    ) -> Self {
        Self {
            git_path: "git".to_string(),
            runtime,
            helper_image: helper_image.into(),
            secrets,
        }
    }

    /// Use a different git executable
    pub fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git_path = git_path.into();
        self
    }

    /// Run `git [-C <dir>] <command> <args>` and return its stdout
    async fn git(
        &self,
        dir: Option<&Path>,
        command: &str,
        args: Vec<OsString>,
        ssh_key: Option<&Path>,
    ) -> Result<String, FetchError> {
        let mut cmd = Command::new(&self.git_path);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.arg(command).args(&args).kill_on_drop(true);
        if let Some(key) = ssh_key {
            cmd.env(
                "GIT_SSH_COMMAND",
                format!("ssh -i {} -o IdentitiesOnly=yes", key.display()),
            );
        }
        let command = command.to_string();

        let output = cmd.output().await.map_err(|e| FetchError::Command {
            command: command.clone(),
            message: format!("failed to run {}: {}", self.git_path, e),
        })?;

        if !output.status.success() {
            return Err(FetchError::Command {
                command,
                message: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Write the deploy key for `url`, if the secrets file has one
    ///
    /// The key is replaced by rename, so a concurrent run never reads a
    /// truncated file.
    fn write_key(
        &self,
        url: &str,
        workspace: &WorkspaceLayout,
    ) -> Result<Option<PathBuf>, FetchError> {
        let Some(key) = self.secrets.private_key(url) else {
            return Ok(None);
        };

        let path = workspace.key_file();
        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp)?;
            file.write_all(key.as_bytes())?;
            if !key.ends_with('\n') {
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(Some(path))
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn ensure_mirror(
        &self,
        url: &str,
        workspace: &WorkspaceLayout,
    ) -> Result<MirrorHandle, FetchError> {
        let repo = workspace.repo_dir();
        let key = self.write_key(url, workspace)?;

        if !repo.join("HEAD").exists() {
            info!("Cloning {} into {}", url, repo.display());
            let args = vec!["--mirror".into(), "--quiet".into(), url.into(), repo.clone().into()];
            self.git(None, "clone", args, key.as_deref()).await?;
        }

        debug!("Fetching {}", url);
        let args = vec!["--prune".into(), "--quiet".into()];
        self.git(Some(&repo), "fetch", args, key.as_deref()).await?;

        Ok(MirrorHandle {
            url: url.to_string(),
            path: repo,
        })
    }

    async fn resolve_branch_head(
        &self,
        mirror: &MirrorHandle,
        branch: &str,
    ) -> Result<Revision, FetchError> {
        let args = vec![
            "-1".into(),
            "--format=%H%x00%ae%x00%aI".into(),
            format!("refs/heads/{}", branch).into(),
        ];
        let stdout = self
            .git(Some(&mirror.path), "log", args, None)
            .await
            .map_err(|e| branch_error(e, branch))?;
        parse_log_line(&stdout).ok_or_else(|| FetchError::UnknownBranch(branch.to_string()))
    }

    async fn extract_checkout(
        &self,
        mirror: &MirrorHandle,
        branch: &str,
        revision: &Revision,
        dest: &Path,
    ) -> Result<(), FetchError> {
        if dest.exists() {
            self.runtime
                .empty_dir(dest, &self.helper_image)
                .await
                .map_err(|e| FetchError::Wipe(e.to_string()))?;
        }

        let args = vec![
            "--quiet".into(),
            "--no-checkout".into(),
            "--branch".into(),
            branch.into(),
            mirror.path.clone().into(),
            dest.into(),
        ];
        self.git(None, "clone", args, None).await?;

        // The mirror may have been fetched again since the head was resolved
        let args = vec!["--quiet".into(), "--detach".into(), revision.id.clone().into()];
        self.git(Some(dest), "checkout", args, None).await?;
        Ok(())
    }
}

/// Map a failed `git log` to [`FetchError::UnknownBranch`] when the ref is missing
fn branch_error(error: FetchError, branch: &str) -> FetchError {
    match error {
        FetchError::Command { ref message, .. }
            if message.contains("unknown revision") || message.contains("bad revision") =>
        {
            FetchError::UnknownBranch(branch.to_string())
        }
        other => other,
    }
}

/// Parse `<hash>\0<email>\0<iso date>` as printed by `git log`
fn parse_log_line(stdout: &str) -> Option<Revision> {
    let mut parts = stdout.trim_end().splitn(3, '\0');
    let id = parts.next()?.trim();
    let author_email = parts.next()?.to_string();
    let authored_at = DateTime::parse_from_rfc3339(parts.next()?.trim()).ok()?;
    if id.is_empty() {
        return None;
    }
    Some(Revision {
        id: id.to_string(),
        author_email,
        authored_at,
    })
}
