//! Process-wide settings

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Image used for privilege-safe directory wipes
pub const DEFAULT_HELPER_IMAGE: &str = "cgicentral/autobuild";

/// Settings shared by every component of one process
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding `.env` and `auth.yaml`
    pub root_dir: PathBuf,

    /// Directory holding pipeline descriptions
    pub scripts_dir: PathBuf,

    /// Directory holding project workspaces
    pub workspace_dir: PathBuf,

    /// Step names skipped in every project
    pub skip_steps: HashSet<String>,

    /// Image used to wipe directories from inside a container
    pub helper_image: String,
}

impl Settings {
    /// Settings rooted at `root_dir` with default script and workspace directories
    ///
    /// The root is made absolute against the current directory, since every
    /// derived path may end up as a container bind mount.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let root_dir = std::path::absolute(&root_dir).unwrap_or(root_dir);
        Self {
            scripts_dir: root_dir.join("scripts"),
            workspace_dir: root_dir.join("workspace"),
            root_dir,
            skip_steps: HashSet::new(),
            helper_image: DEFAULT_HELPER_IMAGE.to_string(),
        }
    }

    pub fn with_scripts_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scripts_dir = self.resolve(dir.as_ref());
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.workspace_dir = self.resolve(dir.as_ref());
        self
    }

    /// Parse a space-separated skip list
    pub fn with_skip_steps(mut self, skip: &str) -> Self {
        self.skip_steps = skip.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_helper_image(mut self, image: impl Into<String>) -> Self {
        self.helper_image = image.into();
        self
    }

    /// Base environment file for step containers
    pub fn env_file(&self) -> PathBuf {
        self.root_dir.join(".env")
    }

    /// Repository credentials file
    pub fn secrets_file(&self) -> PathBuf {
        self.root_dir.join("auth.yaml")
    }

    /// Whether `step` is in the global skip list
    pub fn skips(&self, step: &str) -> bool {
        self.skip_steps.contains(step)
    }

    /// Resolve a path relative to the root directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Space-separated skip list, as accepted by [`Settings::with_skip_steps`]
    pub fn skip_steps_string(&self) -> String {
        let mut steps: Vec<&str> = self.skip_steps.iter().map(String::as_str).collect();
        steps.sort_unstable();
        steps.join(" ")
    }
}
