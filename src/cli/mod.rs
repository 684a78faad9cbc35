//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::Settings;
use clap::{Parser, Subcommand};
use commands::{BuildCommand, DaemonCommand, ListCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Local CI: containerized pipelines keyed by git revision
#[derive(Debug, Parser, Clone)]
#[command(name = "autobuild")]
#[command(version)]
#[command(about = "Build projects in containers whenever their branch moves", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding .env and auth.yaml
    #[arg(long, global = true, env = "AUTOBUILD_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Directory holding pipeline descriptions [default: <root>/scripts]
    #[arg(long, global = true, env = "SCRIPTS_DIR")]
    pub scripts_dir: Option<PathBuf>,

    /// Directory holding project workspaces [default: <root>/workspace]
    #[arg(long, global = true, env = "WORKSPACE_DIR")]
    pub workspace_dir: Option<PathBuf>,

    /// Space-separated step names to skip in every project
    #[arg(long, global = true, env = "SKIP_STEPS", default_value = "")]
    pub skip_steps: String,

    /// Image used to wipe directories from inside a container
    #[arg(long, global = true, env = "AUTOBUILD_HELPER_IMAGE", default_value = crate::core::DEFAULT_HELPER_IMAGE)]
    pub helper_image: String,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Build projects (all of them when none are named)
    Build(BuildCommand),

    /// Watch the trigger directory and dispatch builds
    Daemon(DaemonCommand),

    /// Validate a pipeline description
    Validate(ValidateCommand),

    /// List projects and their revision state
    List(ListCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Process settings; relative paths resolve against the root
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::new(&self.root)
            .with_skip_steps(&self.skip_steps)
            .with_helper_image(&self.helper_image);
        if let Some(dir) = &self.scripts_dir {
            settings = settings.with_scripts_dir(dir);
        }
        if let Some(dir) = &self.workspace_dir {
            settings = settings.with_workspace_dir(dir);
        }
        settings
    }
}
