//! Project domain model

use crate::core::{config::PipelineConfig, step::Step};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Extension of pipeline description files
pub const DESCRIPTION_EXT: &str = "yaml";

/// A project: one repository, one branch, one ordered list of steps
#[derive(Debug, Clone)]
pub struct Project {
    /// Project name (file stem of its description)
    pub name: String,

    /// Repository URL
    pub repository: String,

    /// Branch to build
    pub branch: String,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Skipped unless forced
    pub disabled: bool,
}

impl Project {
    /// Create a project from its description
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let base_dir = config
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        let steps = config
            .steps
            .iter()
            .map(|name| {
                let section = config.step_config(name)?;
                Step::from_config(name, &section, &base_dir)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Project {
            name: config.name.clone(),
            repository: config.git.clone(),
            branch: config.branch.clone(),
            steps,
            disabled: config.disabled,
        })
    }

    /// Load the project `name` from the script directory
    pub fn load(scripts_dir: &Path, name: &str) -> Result<Self> {
        let path = description_path(scripts_dir, name);
        if !path.is_file() {
            anyhow::bail!("Script does not exist: {}", path.display());
        }
        PipelineConfig::from_file(&path)?
            .to_project()
            .with_context(|| format!("Failed to load project {}", name))
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Path of the description for `name`
pub fn description_path(scripts_dir: &Path, name: &str) -> PathBuf {
    scripts_dir.join(format!("{}.{}", name, DESCRIPTION_EXT))
}

/// Whether a description for `name` exists
pub fn project_exists(scripts_dir: &Path, name: &str) -> bool {
    description_path(scripts_dir, name).is_file()
}

/// Names of all projects in the script directory, sorted
pub fn discover_projects(scripts_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(scripts_dir)
        .with_context(|| format!("Failed to read script directory {}", scripts_dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DESCRIPTION_EXT) || !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
