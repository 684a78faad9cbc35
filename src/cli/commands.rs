//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Build projects
#[derive(Debug, Args, Clone)]
pub struct BuildCommand {
    /// Clear revision state and build even disabled projects
    #[arg(short, long)]
    pub force: bool,

    /// Projects to build; all projects when empty
    pub projects: Vec<String>,
}

/// Watch the trigger directory
#[derive(Debug, Args, Clone)]
pub struct DaemonCommand {
    /// Directory receiving trigger files
    #[arg(long, env = "WEBHOOK_DIRECTORY")]
    pub webhook_dir: PathBuf,

    /// Rotating log of dispatched builds
    #[arg(long, env = "DAEMON_LOG")]
    pub daemon_log: Option<PathBuf>,
}

/// Validate a pipeline description
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Project name
    pub project: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List projects
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
