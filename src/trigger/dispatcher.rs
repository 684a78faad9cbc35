//! Trigger dispatcher - turns trigger files into build invocations

use crate::core::{project_exists, Settings};
use crate::trigger::DispatchLog;
use async_trait::async_trait;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Names a trigger file may have
static TRIGGER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("constant regex pattern is valid"));

/// Whether `name` is an acceptable trigger file name
pub fn is_valid_trigger_name(name: &str) -> bool {
    TRIGGER_NAME.is_match(name)
}

/// Finished out-of-process build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Exit code; `None` if killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Starts the build of one project and waits for it
#[async_trait]
pub trait BuildInvoker: Send + Sync {
    async fn invoke(&self, project: &str) -> io::Result<Invocation>;
}

/// Runs `<program> build <project>` as a child process
///
/// Settings reach the child through the environment variables its
/// command line reads.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    program: PathBuf,
    settings: Settings,
}

impl ProcessInvoker {
    pub fn new(program: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }

    /// Invoke the currently running executable
    pub fn current_exe(settings: Settings) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, settings))
    }

    fn command(&self, project: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("build")
            .arg(project)
            .env("AUTOBUILD_ROOT", &self.settings.root_dir)
            .env("SCRIPTS_DIR", &self.settings.scripts_dir)
            .env("WORKSPACE_DIR", &self.settings.workspace_dir)
            .env("SKIP_STEPS", self.settings.skip_steps_string())
            .env("AUTOBUILD_HELPER_IMAGE", &self.settings.helper_image)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BuildInvoker for ProcessInvoker {
    async fn invoke(&self, project: &str) -> io::Result<Invocation> {
        debug!("Invoking {} build {}", self.program.display(), project);
        let output = self.command(project).output().await?;
        Ok(Invocation {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// What happened to one directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Build ran; carries its exit code
    Invoked { project: String, exit_code: Option<i32> },
    /// Name failed the pattern; entry removed, nothing run
    InvalidName(String),
    /// No description for this project; entry removed, nothing run
    UnknownProject(String),
    /// Entry is not a file and was left in place
    NotAFile(String),
    /// Entry could not be removed or the build could not be started
    Failed { name: String, error: String },
}

/// Consumes trigger files and starts the matching builds
pub struct Dispatcher {
    scripts_dir: PathBuf,
    invoker: Arc<dyn BuildInvoker>,
    log: DispatchLog,
}

impl Dispatcher {
    pub fn new(scripts_dir: impl Into<PathBuf>, invoker: Arc<dyn BuildInvoker>, log: DispatchLog) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            invoker,
            log,
        }
    }

    /// Handle every entry currently in `dir`
    ///
    /// Each trigger file is removed before its build starts, so a trigger
    /// is consumed at most once.
    pub async fn scan(&self, dir: &Path) -> Vec<DispatchOutcome> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().map(|t| !t.is_dir()).unwrap_or(false);
            names.push((name, entry.path(), is_file));
        }
        names.sort();

        let mut outcomes = Vec::with_capacity(names.len());
        for (name, path, is_file) in names {
            info!("New trigger file: {}", name);
            if !is_file {
                warn!("Ignoring {}: not a file", path.display());
                outcomes.push(DispatchOutcome::NotAFile(name));
                continue;
            }
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    error!("Cannot remove trigger {}: {}", path.display(), e);
                    outcomes.push(DispatchOutcome::Failed {
                        name,
                        error: e.to_string(),
                    });
                }
                continue;
            }
            outcomes.push(self.dispatch(&name).await);
        }
        outcomes
    }

    /// Start the build named by an already consumed trigger
    pub async fn dispatch(&self, name: &str) -> DispatchOutcome {
        if !is_valid_trigger_name(name) {
            warn!("Ignoring trigger with invalid name: {:?}", name);
            return DispatchOutcome::InvalidName(name.to_string());
        }
        if !project_exists(&self.scripts_dir, name) {
            error!("Unknown task, no script found: {}", name);
            self.log.error(&format!("Unknown task, no script found: {}", name));
            return DispatchOutcome::UnknownProject(name.to_string());
        }

        self.log.info(&format!("===== {} =====", name));
        match self.invoker.invoke(name).await {
            Ok(invocation) => {
                if invocation.success() {
                    info!("Build of {} finished", name);
                    self.log.info("Finished successfully");
                    self.log.info(&invocation.stderr);
                    self.log.info(&invocation.stdout);
                } else {
                    let code = invocation
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    error!("Build of {} failed, exit code {}", name, code);
                    self.log.error(&format!("Failed, exit code {}", code));
                    self.log.error(&invocation.stderr);
                    self.log.error(&invocation.stdout);
                }
                DispatchOutcome::Invoked {
                    project: name.to_string(),
                    exit_code: invocation.exit_code,
                }
            }
            Err(e) => {
                error!("Error running build of {}: {}", name, e);
                self.log.error(&format!("Error running build: {}", e));
                DispatchOutcome::Failed {
                    name: name.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}
