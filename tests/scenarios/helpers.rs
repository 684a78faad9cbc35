//! Test utility functions for autobuild scenarios

use async_trait::async_trait;
use autobuild::core::{container_path, Settings, WorkspaceLayout};
use autobuild::execution::BuildRunner;
use autobuild::persistence::RevisionStateStore;
use autobuild::runtime::{ContainerExit, ContainerRuntime, ContainerSpec, OutputSink, RuntimeError};
use autobuild::source::{FetchError, MirrorHandle, Revision, SourceFetcher};
use autobuild::trigger::{BuildInvoker, ChangeStream, Invocation, WatchError, WatchSource};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Fetcher that serves a settable revision and fakes checkouts
pub struct FakeFetcher {
    revision: Mutex<String>,
    next_revision: Mutex<Option<String>>,
    fail_fetch: AtomicBool,
    pub mirror_calls: AtomicUsize,
    pub checkout_calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(revision: &str) -> Self {
        Self {
            revision: Mutex::new(revision.to_string()),
            next_revision: Mutex::new(None),
            fail_fetch: AtomicBool::new(false),
            mirror_calls: AtomicUsize::new(0),
            checkout_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_revision(&self, revision: &str) {
        *self.revision.lock().unwrap() = revision.to_string();
    }

    /// Move the branch head to `revision` right after it is next resolved
    pub fn advance_after_resolve(&self, revision: &str) {
        *self.next_revision.lock().unwrap() = Some(revision.to_string());
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn checkouts(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn ensure_mirror(
        &self,
        url: &str,
        workspace: &WorkspaceLayout,
    ) -> Result<MirrorHandle, FetchError> {
        self.mirror_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(FetchError::Command {
                command: "fetch".to_string(),
                message: "remote unreachable".to_string(),
            });
        }
        Ok(MirrorHandle {
            url: url.to_string(),
            path: workspace.repo_dir(),
        })
    }

    async fn resolve_branch_head(
        &self,
        _mirror: &MirrorHandle,
        _branch: &str,
    ) -> Result<Revision, FetchError> {
        let mut head = self.revision.lock().unwrap();
        let id = head.clone();
        if let Some(next) = self.next_revision.lock().unwrap().take() {
            *head = next;
        }
        Ok(Revision {
            id,
            author_email: "dev@example.com".to_string(),
            authored_at: Utc::now().fixed_offset(),
        })
    }

    async fn extract_checkout(
        &self,
        _mirror: &MirrorHandle,
        _branch: &str,
        revision: &Revision,
        dest: &Path,
    ) -> Result<(), FetchError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        if dest.exists() {
            fs::remove_dir_all(dest)?;
        }
        fs::create_dir_all(dest)?;
        fs::write(dest.join("README"), revision.id.as_bytes())?;
        Ok(())
    }
}

/// Runtime that records containers and interprets a tiny script subset
///
/// `touch <path>` creates a file through the container's mounts and
/// `false` exits with status 1. Everything else succeeds.
#[derive(Default)]
pub struct FakeRuntime {
    pub runs: Mutex<Vec<ContainerSpec>>,
    pub builds: Mutex<Vec<String>>,
    pub wiped: Mutex<Vec<PathBuf>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeRuntime {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn last_run(&self) -> ContainerSpec {
        self.runs.lock().unwrap().last().cloned().expect("no container was run")
    }
}

/// Host path behind `container` given a container's mounts
fn host_path(spec: &ContainerSpec, container: &str) -> Option<PathBuf> {
    spec.mounts
        .iter()
        .filter(|m| container == m.container || container.starts_with(&format!("{}/", m.container)))
        .max_by_key(|m| m.container.len())
        .map(|m| {
            let rest = container[m.container.len()..].trim_start_matches('/');
            m.host.join(rest)
        })
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(
        &self,
        _context: &Path,
        tag: &str,
        sink: &dyn OutputSink,
    ) -> Result<String, RuntimeError> {
        sink.on_line("Successfully built");
        self.builds.lock().unwrap().push(tag.to_string());
        Ok(tag.to_string())
    }

    async fn run(
        &self,
        spec: &ContainerSpec,
        sink: &dyn OutputSink,
    ) -> Result<ContainerExit, RuntimeError> {
        self.runs.lock().unwrap().push(spec.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = spec.command.last().cloned().unwrap_or_default();
        let mut output = String::new();
        for line in script.lines() {
            sink.on_line(line);
            output.push_str(line);
            output.push('\n');

            if line.trim() == "false" {
                return Ok(ContainerExit {
                    status_code: 1,
                    output,
                });
            }
            if let Some(path) = line.strip_prefix("touch ") {
                if let Some(host) = host_path(spec, &container_path(path.trim())) {
                    if let Some(parent) = host.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&host, "")?;
                }
            }
        }

        Ok(ContainerExit {
            status_code: 0,
            output,
        })
    }

    async fn empty_dir(&self, dir: &Path, _helper_image: &str) -> Result<(), RuntimeError> {
        self.wiped.lock().unwrap().push(dir.to_path_buf());
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Invoker that records project names
#[derive(Default)]
pub struct FakeInvoker {
    pub calls: Mutex<Vec<String>>,
}

impl FakeInvoker {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildInvoker for FakeInvoker {
    async fn invoke(&self, project: &str) -> io::Result<Invocation> {
        self.calls.lock().unwrap().push(project.to_string());
        Ok(Invocation {
            exit_code: Some(0),
            stdout: format!("built {}", project),
            stderr: String::new(),
        })
    }
}

/// Watch source whose notifications are sent by the test
#[derive(Default)]
pub struct FakeWatchSource {
    sender: Mutex<Option<mpsc::UnboundedSender<()>>>,
    pub watches: AtomicUsize,
}

impl FakeWatchSource {
    /// Signal a change on the current watch
    pub fn notify(&self) {
        if let Some(tx) = self.sender.lock().unwrap().as_ref() {
            let _ = tx.send(());
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }
}

impl WatchSource for FakeWatchSource {
    fn watch(&self, _dir: &Path) -> Result<ChangeStream, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        self.watches.fetch_add(1, Ordering::SeqCst);
        Ok(ChangeStream::new(rx, ()))
    }
}

/// A root directory with scripts, workspaces and fakes wired together
pub struct TestEnv {
    pub root: TempDir,
    pub settings: Settings,
    pub fetcher: Arc<FakeFetcher>,
    pub runtime: Arc<FakeRuntime>,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::new(root.path());
        fs::create_dir_all(&settings.scripts_dir).unwrap();
        Self {
            root,
            settings,
            fetcher: Arc::new(FakeFetcher::new("1111111111111111111111111111111111111111")),
            runtime: Arc::new(FakeRuntime::default()),
        }
    }

    pub fn with_skip_steps(mut self, skip: &str) -> Self {
        self.settings = self.settings.with_skip_steps(skip);
        self
    }

    pub fn write_project(&self, name: &str, yaml: &str) {
        fs::write(self.settings.scripts_dir.join(format!("{}.yaml", name)), yaml).unwrap();
    }

    pub fn write_env(&self, content: &str) {
        fs::write(self.settings.env_file(), content).unwrap();
    }

    pub fn runner(&self) -> BuildRunner {
        BuildRunner::new(
            self.settings.clone(),
            self.fetcher.clone(),
            self.runtime.clone(),
        )
    }

    pub fn workspace(&self, name: &str) -> WorkspaceLayout {
        WorkspaceLayout::new(&self.settings.workspace_dir, name)
    }

    pub fn store(&self, name: &str) -> RevisionStateStore {
        RevisionStateStore::new(&self.workspace(name))
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }
}

/// Single-step project running `script`
pub fn simple_project(script: &[&str]) -> String {
    let lines: Vec<String> = script.iter().map(|l| format!("      - \"{}\"", l)).collect();
    format!(
        "git: git@example.com:org/site.git\nbranch: main\nsteps: [build]\nbuild:\n  image: alpine\n  script:\n{}\n",
        lines.join("\n")
    )
}

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
