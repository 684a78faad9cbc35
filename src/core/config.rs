//! Pipeline description loaded from YAML

use crate::core::Project;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level pipeline description, one file per project
///
/// Besides the fixed keys every top-level key is a step section named in
/// `steps`; anything else is rejected by [`PipelineConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project name, taken from the file stem
    #[serde(skip)]
    pub name: String,

    /// Directory the description was loaded from
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,

    /// Repository URL
    pub git: String,

    /// Branch to build
    pub branch: String,

    /// Step names in execution order
    pub steps: Vec<String>,

    /// Skip this project unless forced
    #[serde(default)]
    pub disabled: bool,

    /// Step sections, keyed by step name
    #[serde(flatten)]
    sections: BTreeMap<String, Value>,
}

/// One step section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    /// Image to run the script in
    #[serde(default)]
    pub image: Option<String>,

    /// Build context directory; the built image replaces `image`
    #[serde(default)]
    pub dockerfile: Option<String>,

    /// Shell command lines
    #[serde(default)]
    pub script: Option<Vec<String>>,

    /// Paths persisted between runs
    #[serde(default)]
    pub cache: Option<CacheConfig>,

    /// Ad-hoc volumes, keyed by mount point
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeConfig>,

    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub paths: Vec<String>,
}

/// Ad-hoc volume definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeConfig {
    /// Local path; defaults to the mount point, relative paths live in the workspace
    #[serde(default)]
    pub local: Option<String>,

    /// Create the local directory if missing
    #[serde(default)]
    pub create: bool,

    /// Empty the local directory before mounting
    #[serde(default)]
    pub empty_local: bool,
}

impl PipelineConfig {
    /// Load a pipeline description; the project name is the file stem
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline description {}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Invalid pipeline file name: {}", path.display()))?;

        let mut config = Self::from_yaml(name, &content)
            .with_context(|| format!("Invalid pipeline description {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse a pipeline description from a YAML string
    pub fn from_yaml(name: &str, yaml: &str) -> Result<Self> {
        let mut config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.name = name.to_string();
        config.validate()?;
        Ok(config)
    }

    /// Validate the description
    pub fn validate(&self) -> Result<()> {
        if self.git.trim().is_empty() {
            anyhow::bail!("'git' must not be empty");
        }
        if self.branch.trim().is_empty() {
            anyhow::bail!("'branch' must not be empty");
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.as_str()) {
                anyhow::bail!("Duplicate step: {}", step);
            }
            let config = self.step_config(step)?;
            config.validate(step)?;
        }

        for key in self.sections.keys() {
            if !seen.contains(key.as_str()) {
                anyhow::bail!("Unknown key '{}' (not a step listed in 'steps')", key);
            }
        }

        Ok(())
    }

    /// Typed section for a step
    pub fn step_config(&self, step: &str) -> Result<StepConfig> {
        let section = self
            .sections
            .get(step)
            .with_context(|| format!("Step '{}' has no section", step))?;
        serde_yaml::from_value(section.clone())
            .with_context(|| format!("Invalid section for step '{}'", step))
    }

    /// Convert to the project domain model
    pub fn to_project(&self) -> Result<Project> {
        Project::from_config(self)
    }
}

impl StepConfig {
    /// Check the keys a step cannot run without
    pub fn validate(&self, step: &str) -> Result<()> {
        let has_image = self.image.as_deref().is_some_and(|i| !i.trim().is_empty());
        let has_context = self.dockerfile.as_deref().is_some_and(|d| !d.trim().is_empty());
        if !has_image && !has_context {
            anyhow::bail!("Step '{}': either 'dockerfile' or 'image' must be specified", step);
        }

        match &self.script {
            Some(lines) if !lines.is_empty() => {}
            _ => anyhow::bail!("Step '{}': build script must be defined", step),
        }

        for (key, value) in &self.env {
            if scalar_to_string(value).is_none() {
                anyhow::bail!("Step '{}': env '{}' must be a scalar value", step, key);
            }
        }

        Ok(())
    }

    /// Step environment rendered as strings
    pub fn env_as_string_map(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
