//! On-disk layout of a project workspace

use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

/// Path the project source is mounted at inside every step container
pub const SOURCE_MOUNT: &str = "/opt/workspace";

/// Fixed set of locations owned by one project
///
/// ```text
/// <workspace_root>/<project>/
///     repo/                 bare mirror of the remote
///     source/               checkout, wiped before every run
///     cache__<path-id>/     one per declared cache path
///     build.lock            cross-process build lock
///     lastcommit            last successfully processed revision
///     lastfailed            last failed revision
///     log                   cumulative log
///     lastlog               log of the latest run only
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Layout for `project` under `workspace_root`
    pub fn new(workspace_root: &Path, project: &str) -> Self {
        Self {
            root: normalize(&workspace_root.join(project)),
        }
    }

    /// Create the workspace root if it does not exist yet
    pub fn ensure(&self) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("build.lock")
    }

    pub fn last_processed_marker(&self) -> PathBuf {
        self.root.join("lastcommit")
    }

    pub fn last_failed_marker(&self) -> PathBuf {
        self.root.join("lastfailed")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn last_log_file(&self) -> PathBuf {
        self.root.join("lastlog")
    }

    /// Private key used for authenticated fetches
    pub fn key_file(&self) -> PathBuf {
        self.root.join("deploy_key")
    }

    /// Persistent directory backing a declared cache path
    pub fn cache_dir(&self, cache_path: &str) -> PathBuf {
        self.root.join(format!("cache__{}", sanitize_path_id(cache_path)))
    }

    /// Resolve a local volume path: relative paths live under the workspace
    pub fn resolve_local(&self, local: &str) -> PathBuf {
        let path = Path::new(local);
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        }
    }

    /// Whether `path` lies inside this workspace (the root itself excluded)
    pub fn contains(&self, path: &Path) -> bool {
        let path = normalize(path);
        path != self.root && path.starts_with(&self.root)
    }
}

/// Replace every non-alphanumeric character with `__`
pub fn sanitize_path_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len() * 2);
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            id.push(ch);
        } else {
            id.push_str("__");
        }
    }
    id
}

/// Lexically resolve `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
