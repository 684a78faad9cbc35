//! Build state machine models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of a single project build
///
/// `Idle → Fetching → Deciding → (Skipped | LockedOut | Running) → (Succeeded | Failed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    Idle,
    Fetching,
    Deciding,
    Skipped,
    LockedOut,
    Running,
    Succeeded,
    Failed,
}

impl BuildPhase {
    /// Check if the phase ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildPhase::Skipped | BuildPhase::LockedOut | BuildPhase::Succeeded | BuildPhase::Failed
        )
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildPhase::Idle => "idle",
            BuildPhase::Fetching => "fetching",
            BuildPhase::Deciding => "deciding",
            BuildPhase::Skipped => "skipped",
            BuildPhase::LockedOut => "locked-out",
            BuildPhase::Running => "running",
            BuildPhase::Succeeded => "succeeded",
            BuildPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run did not start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Revision already built successfully
    AlreadyProcessed,
    /// Last attempt at this revision failed
    AlreadyFailed,
    /// Another run holds the workspace lock
    LockedOut,
    /// Project is disabled
    Disabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::AlreadyProcessed => "no new commit",
            SkipReason::AlreadyFailed => "last run of this commit failed",
            SkipReason::LockedOut => "work in progress",
            SkipReason::Disabled => "disabled",
        };
        f.write_str(reason)
    }
}

/// Result of one project run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Succeeded,
    Failed {
        error: String,
        /// Failing step, when a step failed
        step: Option<String>,
    },
}

impl RunOutcome {
    /// Terminal phase this outcome corresponds to
    pub fn phase(&self) -> BuildPhase {
        match self {
            RunOutcome::Skipped(SkipReason::LockedOut) => BuildPhase::LockedOut,
            RunOutcome::Skipped(_) => BuildPhase::Skipped,
            RunOutcome::Succeeded => BuildPhase::Succeeded,
            RunOutcome::Failed { .. } => BuildPhase::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Summary of one project run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Unique run ID
    pub run_id: Uuid,

    /// Project name
    pub project: String,

    /// Revision resolved for this run, if fetching got that far
    pub revision: Option<String>,

    /// How the run ended
    pub outcome: RunOutcome,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
