//! Persistence layer for per-project build state
//!
//! Everything a run leaves behind lives in plain files in the project
//! workspace: the revision markers, the build lock and the log files.
//! Builds running in separate processes share nothing else.

pub mod build_log;
pub mod lock;

pub use build_log::BuildLog;
pub use lock::BuildLock;

use crate::core::{SkipReason, WorkspaceLayout};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Last processed and last failed revision of one project
///
/// The two markers are independent last-write-wins values. Recording a
/// success never clears the failure marker and vice versa.
#[derive(Debug, Clone)]
pub struct RevisionStateStore {
    processed: PathBuf,
    failed: PathBuf,
}

impl RevisionStateStore {
    pub fn new(workspace: &WorkspaceLayout) -> Self {
        Self {
            processed: workspace.last_processed_marker(),
            failed: workspace.last_failed_marker(),
        }
    }

    pub fn last_processed(&self) -> io::Result<Option<String>> {
        read_marker(&self.processed)
    }

    pub fn last_failed(&self) -> io::Result<Option<String>> {
        read_marker(&self.failed)
    }

    /// Forget both markers
    pub fn clear(&self) -> io::Result<()> {
        remove_marker(&self.processed)?;
        remove_marker(&self.failed)
    }

    /// Why a run at `revision` should not start, if it should not
    ///
    /// `force` clears both markers first, so the run always proceeds.
    pub fn skip_reason(&self, revision: &str, force: bool) -> io::Result<Option<SkipReason>> {
        if force {
            self.clear()?;
            return Ok(None);
        }
        if self.last_failed()?.as_deref() == Some(revision) {
            return Ok(Some(SkipReason::AlreadyFailed));
        }
        if self.last_processed()?.as_deref() == Some(revision) {
            return Ok(Some(SkipReason::AlreadyProcessed));
        }
        Ok(None)
    }

    pub fn should_skip(&self, revision: &str, force: bool) -> io::Result<bool> {
        Ok(self.skip_reason(revision, force)?.is_some())
    }

    pub fn record_success(&self, revision: &str) -> io::Result<()> {
        debug!("Recording processed revision {}", revision);
        write_marker(&self.processed, revision)
    }

    pub fn record_failure(&self, revision: &str) -> io::Result<()> {
        debug!("Recording failed revision {}", revision);
        write_marker(&self.failed, revision)
    }
}

fn read_marker(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let value = content.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replace the marker through a rename so readers never see a partial value
fn write_marker(path: &Path, value: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "{}", value)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn remove_marker(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
