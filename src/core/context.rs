//! Build context - per-run facts shared by every step

use crate::core::{step::Step, workspace::{WorkspaceLayout, SOURCE_MOUNT}};
use crate::source::Revision;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Execution context for one project run
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project name
    pub project: String,

    /// Revision being built
    pub revision: Revision,

    /// Branch being built
    pub branch: String,

    /// Project workspace
    pub workspace: WorkspaceLayout,

    /// Base environment from the dotenv file
    pub base_env: BTreeMap<String, String>,

    /// Steps skipped in every project
    pub skip_steps: HashSet<String>,
}

impl BuildContext {
    /// Variables every step receives
    pub fn builtin_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CI_PROJECT_DIR".to_string(), SOURCE_MOUNT.to_string());
        env.insert("CI_COMMIT_SHA".to_string(), self.revision.id.clone());
        env.insert("CI_BRANCH".to_string(), self.branch.clone());
        env
    }

    /// Environment for `step`: base, then builtins, then step variables
    ///
    /// Later layers win on key collision.
    pub fn step_env(&self, step: &Step) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        env.extend(self.builtin_env());
        env.extend(step.env.clone());
        env
    }

    /// Whether `step` is in the global skip list
    pub fn skips(&self, step: &str) -> bool {
        self.skip_steps.contains(step)
    }
}

/// Read a dotenv-style file; a missing file yields an empty map
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let mut env = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to read env file {}", path.display()))?;
    for item in iter {
        let (key, value) =
            item.with_context(|| format!("Invalid line in env file {}", path.display()))?;
        env.insert(key, value);
    }
    Ok(env)
}
