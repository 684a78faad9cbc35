//! CLI output formatting

use crate::core::{BuildReport, Project, RunOutcome, SkipReason};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static LOCKED: Emoji<'_, '_> = Emoji("🔒 ", "# ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a run outcome for display
pub fn format_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Succeeded => style("SUCCEEDED").green().to_string(),
        RunOutcome::Skipped(SkipReason::LockedOut) => style("LOCKED OUT").yellow().to_string(),
        RunOutcome::Skipped(reason) => format!("{} ({})", style("SKIPPED").dim(), reason),
        RunOutcome::Failed { step: Some(step), .. } => {
            format!("{} at step {}", style("FAILED").red(), style(step).bold())
        }
        RunOutcome::Failed { step: None, .. } => style("FAILED").red().to_string(),
    }
}

/// One line per finished run
pub fn format_report(report: &BuildReport) -> String {
    let icon = match &report.outcome {
        RunOutcome::Succeeded => CHECK,
        RunOutcome::Failed { .. } => CROSS,
        RunOutcome::Skipped(SkipReason::LockedOut) => LOCKED,
        RunOutcome::Skipped(_) => SKIP,
    };

    let revision = report
        .revision
        .as_deref()
        .map(short_revision)
        .unwrap_or("-");

    let mut line = format!(
        "{} {} {} {} ({})",
        icon,
        style(&report.project).bold(),
        style(revision).dim(),
        format_outcome(&report.outcome),
        format_duration(report.finished_at.signed_duration_since(report.started_at)),
    );

    if let RunOutcome::Failed { error, .. } = &report.outcome {
        line.push_str(&format!("\n    {}", style(error).red()));
    }
    line
}

/// Project listing entry
pub fn format_project(project: &Project, last_processed: Option<&str>, last_failed: Option<&str>) -> String {
    let mut line = format!(
        "  {} {} ({} steps)",
        style(&project.name).bold(),
        style(&project.branch).cyan(),
        project.steps.len()
    );
    if project.disabled {
        line.push_str(&format!(" {}", style("disabled").yellow()));
    }
    if let Some(rev) = last_processed {
        line.push_str(&format!(" {} {}", CHECK, style(short_revision(rev)).green()));
    }
    if let Some(rev) = last_failed {
        line.push_str(&format!(" {} {}", CROSS, style(short_revision(rev)).red()));
    }
    line
}

/// First 8 characters of a revision id
pub fn short_revision(revision: &str) -> &str {
    revision.get(..8).unwrap_or(revision)
}

fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
