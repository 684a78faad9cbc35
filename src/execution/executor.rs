//! Pipeline executor - runs steps in containers

use crate::{
    core::{container_path, BuildContext, BuildError, ImageSource, Step, StepFailure, SOURCE_MOUNT},
    persistence::BuildLog,
    runtime::{ContainerRuntime, ContainerSpec, Mount},
};
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::sync::Arc;

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Container exited with status 0
    Completed,
    /// Step is in the global skip list
    Skipped,
}

/// Runs the ordered steps of a project, one container per step
pub struct PipelineExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    helper_image: String,
}

impl PipelineExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, helper_image: impl Into<String>) -> Self {
        Self {
            runtime,
            helper_image: helper_image.into(),
        }
    }

    /// Run `steps` in order, stopping at the first failure
    pub async fn run_pipeline(
        &self,
        steps: &[Step],
        ctx: &BuildContext,
        log: &BuildLog,
    ) -> Result<Vec<(String, StepResult)>, BuildError> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            let result = self.run_step(step, ctx, log).await?;
            results.push((step.name.clone(), result));
        }
        Ok(results)
    }

    /// Run one step in a fresh container
    pub async fn run_step(
        &self,
        step: &Step,
        ctx: &BuildContext,
        log: &BuildLog,
    ) -> Result<StepResult, BuildError> {
        let step_log = log.child(&step.name);

        if ctx.skips(&step.name) {
            step_log.info("Skipping step (in skip list)");
            return Ok(StepResult::Skipped);
        }

        step_log.info("Running step");

        let image = self.resolve_image(step, ctx, &step_log).await?;
        let mounts = self.prepare_mounts(step, ctx, &step_log).await?;

        let mut spec = ContainerSpec::shell(image, &step.command());
        spec.env = ctx.step_env(step);
        spec.mounts = mounts;

        let exit = self
            .runtime
            .run(&spec, &step_log)
            .await
            .map_err(|e| {
                BuildError::Step(StepFailure {
                    step: step.name.clone(),
                    reason: e.to_string(),
                    output: String::new(),
                })
            })?;

        if !exit.success() {
            step_log.error(format!("Container exited with status {}", exit.status_code));
            return Err(BuildError::Step(StepFailure {
                step: step.name.clone(),
                reason: format!("exit status {}", exit.status_code),
                output: exit.output,
            }));
        }

        step_log.info("Step completed");
        Ok(StepResult::Completed)
    }

    /// Image reference for `step`, building it first if it has a context
    pub async fn resolve_image(
        &self,
        step: &Step,
        ctx: &BuildContext,
        log: &BuildLog,
    ) -> Result<String, BuildError> {
        match &step.image {
            ImageSource::Image(image) => Ok(image.clone()),
            ImageSource::Build { context } => {
                let tag = step.image_tag(&ctx.project);
                log.info(format!("Building image {} from {}", tag, context.display()));
                self.runtime
                    .build_image(context, &tag, &log.quiet_output())
                    .await
                    .map_err(|e| {
                        BuildError::Step(StepFailure {
                            step: step.name.clone(),
                            reason: e.to_string(),
                            output: String::new(),
                        })
                    })
            }
        }
    }

    /// Source, cache and volume mounts for `step`
    ///
    /// Every volume is checked before any directory is created or emptied,
    /// so a rejected step leaves the host untouched.
    pub async fn prepare_mounts(
        &self,
        step: &Step,
        ctx: &BuildContext,
        log: &BuildLog,
    ) -> Result<Vec<Mount>, BuildError> {
        let workspace = &ctx.workspace;

        let volumes = step
            .volumes
            .iter()
            .map(|volume| {
                let local = workspace.resolve_local(&volume.local);
                if volume.empty_local && !workspace.contains(&local) {
                    return Err(BuildError::Config(format!(
                        "step '{}': volume path {} is not inside workspace {}",
                        step.name,
                        local.display(),
                        workspace.root().display()
                    )));
                }
                Ok((volume, local))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut mounts = vec![Mount::new(workspace.source_dir(), SOURCE_MOUNT)];

        for path in &step.cache_paths {
            let dir = workspace.cache_dir(path);
            if !dir.exists() {
                log.debug(format!("Creating cache directory {}", dir.display()));
                DirBuilder::new().mode(0o755).create(&dir)?;
            }
            mounts.push(Mount::new(dir, container_path(path)));
        }

        for (volume, local) in volumes {
            if volume.create && !local.exists() {
                log.debug(format!("Creating volume directory {}", local.display()));
                DirBuilder::new().recursive(true).mode(0o755).create(&local)?;
            }
            if volume.empty_local && local.exists() {
                log.debug(format!("Emptying volume directory {}", local.display()));
                self.runtime.empty_dir(&local, &self.helper_image).await?;
            }
            mounts.push(Mount::new(local, container_path(&volume.mount_point)));
        }

        log.debug(format!(
            "Mounts: {}",
            mounts
                .iter()
                .map(|m| format!("{}:{}", m.host.display(), m.container))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        Ok(mounts)
    }
}
