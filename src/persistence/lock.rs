//! Cross-process build lock

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a project's lock file
///
/// The lock is released when the guard is dropped. The file itself stays on
/// disk so every process always locks the same inode.
#[derive(Debug)]
pub struct BuildLock {
    file: Option<File>,
}

impl BuildLock {
    /// Try to take the lock at `path`
    ///
    /// Non-blocking mode makes a single attempt. Blocking mode retries until
    /// `timeout` elapses. Returns `Ok(None)` if another holder owns the lock.
    pub async fn acquire(path: &Path, blocking: bool, timeout: Duration) -> io::Result<Option<Self>> {
        // Truncating before the lock is held would wipe the holder's PID
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if !blocking || Instant::now() >= deadline {
                        debug!("Lock {} is held elsewhere", path.display());
                        return Ok(None);
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Some(Self { file: Some(file) }))
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Release the lock; later calls do nothing
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!("Failed to unlock build lock: {}", e);
            }
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        self.release();
    }
}
