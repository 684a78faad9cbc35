//! Per-project log files

use crate::runtime::OutputSink;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn, Level};

/// Log of one project run
///
/// Lines go to every attached file as
/// `<timestamp>\t<project[.step]>\t<LEVEL>\t<message>` and are mirrored as
/// tracing events. Child logs created with [`BuildLog::child`] share the
/// same files.
#[derive(Debug, Clone)]
pub struct BuildLog {
    target: String,
    files: Arc<Mutex<Vec<File>>>,
    /// Level used for lines arriving through [`OutputSink`]
    output_level: Level,
}

impl BuildLog {
    /// A log that only emits tracing events until files are attached
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            target: project.into(),
            files: Arc::new(Mutex::new(Vec::new())),
            output_level: Level::INFO,
        }
    }

    /// Append to the cumulative log
    pub fn attach_cumulative(&self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.attach(file);
        Ok(())
    }

    /// Start the latest-run log afresh
    pub fn attach_latest(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        self.attach(file);
        Ok(())
    }

    fn attach(&self, file: File) {
        if let Ok(mut files) = self.files.lock() {
            files.push(file);
        }
    }

    /// Log scoped to `step`, sharing this log's files
    pub fn child(&self, step: &str) -> Self {
        Self {
            target: format!("{}.{}", self.target, step),
            files: Arc::clone(&self.files),
            output_level: self.output_level,
        }
    }

    /// Same log, recording streamed output at debug level
    pub fn quiet_output(&self) -> Self {
        Self {
            output_level: Level::DEBUG,
            ..self.clone()
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.write(Level::DEBUG, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(Level::ERROR, message.as_ref());
    }

    fn write(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => error!(project = %self.target, "{}", message),
            Level::WARN => warn!(project = %self.target, "{}", message),
            Level::INFO => info!(project = %self.target, "{}", message),
            _ => debug!(project = %self.target, "{}", message),
        }

        let line = format!(
            "{}\t{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            self.target,
            level,
            message
        );
        let Ok(mut files) = self.files.lock() else {
            return;
        };
        for file in files.iter_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!("Failed to write build log: {}", e);
            }
        }
    }
}

impl OutputSink for BuildLog {
    fn on_line(&self, line: &str) {
        self.write(self.output_level, line);
    }
}
