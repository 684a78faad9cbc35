//! Step domain model

use crate::core::config::StepConfig;
use crate::core::workspace::SOURCE_MOUNT;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where the image for a step comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Use an existing image reference
    Image(String),
    /// Build an image from a context directory
    Build { context: PathBuf },
}

/// Ad-hoc volume mounted into a step container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Mount point inside the container, as declared
    pub mount_point: String,
    /// Local path, as declared (defaults to the mount point)
    pub local: String,
    /// Create the local directory if missing
    pub create: bool,
    /// Empty the local directory before mounting
    pub empty_local: bool,
}

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name, unique within the project
    pub name: String,

    /// Image to run in
    pub image: ImageSource,

    /// Shell command lines, run by one `sh -ex`
    pub script: Vec<String>,

    /// Paths persisted across runs
    pub cache_paths: Vec<String>,

    /// Ad-hoc volumes
    pub volumes: Vec<VolumeSpec>,

    /// Step-level environment overlay
    pub env: BTreeMap<String, String>,
}

impl Step {
    /// Create a step from its section
    ///
    /// Relative build contexts resolve against `base_dir`.
    pub fn from_config(name: &str, config: &StepConfig, base_dir: &Path) -> Result<Self> {
        config.validate(name)?;

        let image = match (&config.dockerfile, &config.image) {
            (Some(context), _) if !context.trim().is_empty() => {
                let context = Path::new(context);
                let context = if context.is_absolute() {
                    context.to_path_buf()
                } else {
                    base_dir.join(context)
                };
                ImageSource::Build { context }
            }
            (_, Some(image)) => ImageSource::Image(image.clone()),
            _ => anyhow::bail!("Step '{}': either 'dockerfile' or 'image' must be specified", name),
        };

        let volumes = config
            .volumes
            .iter()
            .map(|(mount_point, volume)| VolumeSpec {
                mount_point: mount_point.clone(),
                local: volume.local.clone().unwrap_or_else(|| mount_point.clone()),
                create: volume.create,
                empty_local: volume.empty_local,
            })
            .collect();

        Ok(Step {
            name: name.to_string(),
            image,
            script: config
                .script
                .clone()
                .with_context(|| format!("Step '{}': build script must be defined", name))?,
            cache_paths: config
                .cache
                .as_ref()
                .map(|c| c.paths.clone())
                .unwrap_or_default(),
            volumes,
            env: config.env_as_string_map(),
        })
    }

    /// The script as a single shell program
    pub fn command(&self) -> String {
        self.script.join("\n")
    }

    /// Deterministic tag for an image built for this step
    pub fn image_tag(&self, project: &str) -> String {
        format!("autobuild__{}_{}", project, self.name).to_lowercase()
    }
}

/// Resolve a declared path to its location inside the container
///
/// Relative paths are placed under the source mount.
pub fn container_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", SOURCE_MOUNT, path.trim_start_matches("./"))
    }
}
