use anyhow::{Context, Result};
use autobuild::cli::commands::{BuildCommand, DaemonCommand, ListCommand, ValidateCommand};
use autobuild::cli::output::*;
use autobuild::cli::{Cli, Command};
use autobuild::core::{config::PipelineConfig, description_path, discover_projects, Project, Settings, WorkspaceLayout};
use autobuild::execution::BuildRunner;
use autobuild::persistence::RevisionStateStore;
use autobuild::runtime::{ContainerRuntime, DockerCli};
use autobuild::source::{GitFetcher, Secrets};
use autobuild::trigger::{DispatchLog, Dispatcher, NotifyWatchSource, ProcessInvoker, TriggerWatcher};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::from_args();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    let settings = cli.settings();

    // Execute command
    match &cli.command {
        Command::Build(cmd) => build_projects(cmd, settings).await?,
        Command::Daemon(cmd) => run_daemon(cmd, settings).await?,
        Command::Validate(cmd) => validate_project(cmd, &settings)?,
        Command::List(cmd) => list_projects(cmd, &settings)?,
    }

    Ok(())
}

async fn build_projects(cmd: &BuildCommand, settings: Settings) -> Result<()> {
    let secrets = Secrets::load(&settings.secrets_file())?;
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::default());
    let fetcher = Arc::new(GitFetcher::new(
        Arc::clone(&runtime),
        settings.helper_image.clone(),
        secrets,
    ));
    let runner = BuildRunner::new(settings, fetcher, runtime);

    let reports = runner
        .run_batch(&cmd.projects, cmd.force)
        .await
        .context("Failed to collect projects")?;

    if reports.is_empty() {
        println!("{} No projects found", INFO);
        return Ok(());
    }

    for report in &reports {
        println!("{}", format_report(report));
    }

    if reports.iter().any(|r| r.outcome.is_failed()) {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_daemon(cmd: &DaemonCommand, settings: Settings) -> Result<()> {
    let dir = settings.resolve(&cmd.webhook_dir);
    if !dir.is_dir() {
        warn!("Trigger directory {} does not exist yet", dir.display());
    }

    let log_path = cmd.daemon_log.as_ref().map(|p| settings.resolve(p));
    if let Some(path) = &log_path {
        info!("Daemon log: {}", path.display());
    }

    let invoker = Arc::new(
        ProcessInvoker::current_exe(settings.clone()).context("Cannot locate own executable")?,
    );
    let dispatcher = Dispatcher::new(settings.scripts_dir.clone(), invoker, DispatchLog::new(log_path));
    let watcher = TriggerWatcher::new(&dir, Arc::new(NotifyWatchSource), dispatcher);

    println!("{} Watching {}", ROCKET, style(dir.display()).bold());
    watcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    println!("{} Stopped", INFO);
    Ok(())
}

fn validate_project(cmd: &ValidateCommand, settings: &Settings) -> Result<()> {
    println!("{} Validating {}...", INFO, style(&cmd.project).bold());

    let path = description_path(&settings.scripts_dir, &cmd.project);
    let result = PipelineConfig::from_file(&path).and_then(|config| {
        let project = config.to_project()?;
        Ok((config, project))
    });

    match result {
        Ok((config, project)) => {
            println!("{} Pipeline description is valid!", CHECK);
            println!("  Repository: {}", style(&project.repository).bold());
            println!("  Branch: {}", style(&project.branch).cyan());
            for step in &project.steps {
                let skipped = if settings.skips(&step.name) { " (skipped)" } else { "" };
                println!(
                    "  Step {}: {} line(s){}",
                    style(&step.name).cyan(),
                    step.script.len(),
                    style(skipped).dim()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn list_projects(cmd: &ListCommand, settings: &Settings) -> Result<()> {
    let names = discover_projects(&settings.scripts_dir)?;
    if names.is_empty() {
        println!("{} No projects in {}", INFO, settings.scripts_dir.display());
        return Ok(());
    }

    let mut json_data = Vec::new();
    if !cmd.json {
        println!("{} Projects:", INFO);
    }

    for name in &names {
        let store = RevisionStateStore::new(&WorkspaceLayout::new(&settings.workspace_dir, name));
        let last_processed = store.last_processed().unwrap_or_default();
        let last_failed = store.last_failed().unwrap_or_default();

        match Project::load(&settings.scripts_dir, name) {
            Ok(project) => {
                if cmd.json {
                    json_data.push(serde_json::json!({
                        "name": project.name,
                        "branch": project.branch,
                        "disabled": project.disabled,
                        "steps": project.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
                        "last_processed": last_processed,
                        "last_failed": last_failed,
                    }));
                } else {
                    println!(
                        "{}",
                        format_project(&project, last_processed.as_deref(), last_failed.as_deref())
                    );
                }
            }
            Err(e) => {
                if cmd.json {
                    json_data.push(serde_json::json!({
                        "name": name,
                        "error": format!("{:#}", e),
                    }));
                } else {
                    println!("  {} {} {}", WARN, style(name).bold(), style(format!("{:#}", e)).red());
                }
            }
        }
    }

    if cmd.json {
        let data = serde_json::json!({ "projects": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    Ok(())
}
