//! Size-rotated log of dispatched builds

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Rotate once the file would grow past this size
pub const MAX_LOG_BYTES: u64 = 16 * 1024;

/// Append-only log with a single `.1` backup
///
/// Without a path, entries go nowhere (they are still traced by callers).
#[derive(Debug)]
pub struct DispatchLog {
    path: Option<PathBuf>,
    max_bytes: u64,
    file: Mutex<Option<File>>,
}

impl DispatchLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            max_bytes: MAX_LOG_BYTES,
            file: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Path of the rotated backup
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    pub fn info(&self, message: &str) {
        self.append("INFO", message);
    }

    pub fn error(&self, message: &str) {
        self.append("ERROR", message);
    }

    fn append(&self, level: &str, message: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let record = format!(
            "{} {} {}\n",
            Local::now().format("%d/%m/%Y %H:%M:%S"),
            level,
            message
        );
        if let Err(e) = self.write_record(path, &record) {
            warn!("Failed to write dispatch log {}: {}", path.display(), e);
        }
    }

    fn write_record(&self, path: &Path, record: &str) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "dispatch log poisoned"))?;

        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size > 0 && size + record.len() as u64 > self.max_bytes {
            *guard = None;
            fs::rename(path, Self::backup_path(path))?;
        }

        if guard.is_none() {
            *guard = Some(OpenOptions::new().create(true).append(true).open(path)?);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(record.as_bytes())?;
        }
        Ok(())
    }
}
