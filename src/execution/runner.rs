//! Build runner - the per-project state machine
//!
//! ```text
//! Idle → Fetching → Deciding → (Skipped | LockedOut | Running) → (Succeeded | Failed)
//! ```
//!
//! Every error is caught here and turned into a [`RunOutcome`], so one
//! project failing never aborts a batch or the trigger loop.

use crate::{
    core::{
        discover_projects, load_env_file, BuildContext, BuildError, BuildPhase, BuildReport,
        Project, RunOutcome, Settings, SkipReason, WorkspaceLayout,
    },
    execution::PipelineExecutor,
    persistence::{BuildLock, BuildLog, RevisionStateStore},
    runtime::ContainerRuntime,
    source::{MirrorHandle, Revision, SourceFetcher},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

/// How long a contended lock is retried in blocking mode
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Composes fetcher, revision state, lock and executor into one run
pub struct BuildRunner {
    settings: Settings,
    fetcher: Arc<dyn SourceFetcher>,
    executor: PipelineExecutor,
}

impl BuildRunner {
    pub fn new(
        settings: Settings,
        fetcher: Arc<dyn SourceFetcher>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let executor = PipelineExecutor::new(runtime, settings.helper_image.clone());
        Self {
            settings,
            fetcher,
            executor,
        }
    }

    /// Run each named project in turn; no names means every project
    pub async fn run_batch(&self, names: &[String], force: bool) -> anyhow::Result<Vec<BuildReport>> {
        let names = if names.is_empty() {
            discover_projects(&self.settings.scripts_dir)?
        } else {
            names.to_vec()
        };

        let mut reports = Vec::with_capacity(names.len());
        for name in &names {
            reports.push(self.run_project(name, force).await);
        }
        Ok(reports)
    }

    /// Run one project to a terminal phase; never fails
    pub async fn run_project(&self, name: &str, force: bool) -> BuildReport {
        let started_at = Utc::now();
        let mut revision = None;

        let outcome = match Project::load(&self.settings.scripts_dir, name) {
            Ok(project) => self.run_loaded(&project, force, &mut revision).await,
            Err(e) => {
                error!(project = %name, "{:#}", e);
                RunOutcome::Failed {
                    error: format!("{:#}", e),
                    step: None,
                }
            }
        };

        BuildReport {
            run_id: Uuid::new_v4(),
            project: name.to_string(),
            revision,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run_loaded(
        &self,
        project: &Project,
        force: bool,
        revision_out: &mut Option<String>,
    ) -> RunOutcome {
        let log = BuildLog::new(&project.name);

        if project.disabled && !force {
            log.info("Project is disabled");
            return RunOutcome::Skipped(SkipReason::Disabled);
        }

        let workspace = WorkspaceLayout::new(&self.settings.workspace_dir, &project.name);
        if let Err(e) = workspace.ensure() {
            log.error(format!("Cannot create workspace {}: {}", workspace.root().display(), e));
            return failed(&BuildError::Io(e));
        }
        if let Err(e) = log.attach_cumulative(&workspace.log_file()) {
            warn!(project = %project.name, "Cannot open log file: {}", e);
        }

        enter(&log, BuildPhase::Fetching);
        let fetched = async {
            let mirror = self
                .fetcher
                .ensure_mirror(&project.repository, &workspace)
                .await?;
            let revision = self
                .fetcher
                .resolve_branch_head(&mirror, &project.branch)
                .await?;
            Ok::<_, BuildError>((mirror, revision))
        };
        let (mirror, revision) = match fetched.await {
            Ok(fetched) => fetched,
            Err(e) => {
                log.error(format!("Fetch failed: {}", e));
                return failed(&e);
            }
        };
        log.info(format!("Current commit: {}", revision));
        *revision_out = Some(revision.id.clone());

        enter(&log, BuildPhase::Deciding);
        let store = RevisionStateStore::new(&workspace);
        match store.skip_reason(&revision.id, force) {
            Ok(Some(reason)) => {
                log.info(format!("Skipping: {}", reason));
                return RunOutcome::Skipped(reason);
            }
            Ok(None) => {}
            Err(e) => {
                log.error(format!("Cannot read revision state: {}", e));
                return failed(&BuildError::Io(e));
            }
        }

        let mut lock = match BuildLock::acquire(&workspace.lock_file(), false, LOCK_TIMEOUT).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                log.info(format!("Skipping: {}", SkipReason::LockedOut));
                return RunOutcome::Skipped(SkipReason::LockedOut);
            }
            Err(e) => {
                log.error(format!("Cannot open lock file: {}", e));
                return failed(&BuildError::Io(e));
            }
        };

        enter(&log, BuildPhase::Running);
        if let Err(e) = log.attach_latest(&workspace.last_log_file()) {
            warn!(project = %project.name, "Cannot open latest log file: {}", e);
        }

        let marker = RevisionMarker::new(&store, &revision.id, &log);
        let result = self
            .run_locked(project, &mirror, revision.clone(), workspace, &log)
            .await;

        let outcome = match result {
            Ok(()) => {
                marker.succeed();
                enter(&log, BuildPhase::Succeeded);
                log.info("Build succeeded");
                RunOutcome::Succeeded
            }
            Err(e) => {
                marker.fail();
                enter(&log, BuildPhase::Failed);
                log.error(format!("Build failed: {}", e));
                failed(&e)
            }
        };

        lock.release();
        outcome
    }

    /// Work done while holding the lock
    async fn run_locked(
        &self,
        project: &Project,
        mirror: &MirrorHandle,
        revision: Revision,
        workspace: WorkspaceLayout,
        log: &BuildLog,
    ) -> Result<(), BuildError> {
        self.fetcher
            .extract_checkout(mirror, &project.branch, &revision, &workspace.source_dir())
            .await?;

        let base_env = load_env_file(&self.settings.env_file())
            .map_err(|e| BuildError::Config(format!("{:#}", e)))?;

        let ctx = BuildContext {
            project: project.name.clone(),
            revision,
            branch: project.branch.clone(),
            workspace,
            base_env,
            skip_steps: self.settings.skip_steps.clone(),
        };

        self.executor.run_pipeline(&project.steps, &ctx, log).await?;
        Ok(())
    }
}

fn enter(log: &BuildLog, phase: BuildPhase) {
    log.debug(format!("Entering phase {}", phase));
}

fn failed(error: &BuildError) -> RunOutcome {
    RunOutcome::Failed {
        error: error.to_string(),
        step: error.failed_step().map(str::to_string),
    }
}

/// Records the run's revision exactly once when leaving Running
///
/// Dropped unresolved (panic, cancellation), it records a failure.
struct RevisionMarker<'a> {
    store: &'a RevisionStateStore,
    revision: &'a str,
    log: &'a BuildLog,
    resolved: bool,
}

impl<'a> RevisionMarker<'a> {
    fn new(store: &'a RevisionStateStore, revision: &'a str, log: &'a BuildLog) -> Self {
        Self {
            store,
            revision,
            log,
            resolved: false,
        }
    }

    fn succeed(mut self) {
        self.resolved = true;
        if let Err(e) = self.store.record_success(self.revision) {
            self.log.error(format!("Cannot record processed revision: {}", e));
        }
    }

    fn fail(mut self) {
        self.resolved = true;
        self.record_failure();
    }

    fn record_failure(&self) {
        if let Err(e) = self.store.record_failure(self.revision) {
            self.log.error(format!("Cannot record failed revision: {}", e));
        }
    }
}

impl Drop for RevisionMarker<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.log.warn("Run interrupted, recording revision as failed");
            self.record_failure();
        }
    }
}
