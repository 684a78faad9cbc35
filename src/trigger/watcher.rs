//! Trigger directory watcher
//!
//! Change notifications are only used as a wake-up signal: every burst of
//! events leads to one full scan of the directory. If the directory is
//! removed or replaced the watch is dropped and re-established once it
//! exists again.

use crate::trigger::Dispatcher;
use notify::event::{AccessKind, AccessMode};
use notify::{EventKind, RecursiveMode, Watcher};
use std::future::Future;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wait per poll before checking the directory itself
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch directory: {0}")]
    Watch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::Watch(e.to_string())
    }
}

/// Result of waiting on a [`ChangeStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Burst {
    /// At least one change arrived; queued ones were drained
    Changed,
    /// Nothing arrived within the wait
    Quiet,
    /// The source stopped producing notifications
    Closed,
}

/// Stream of change notifications for one directory
///
/// Holds whatever keeps the underlying watch alive; dropping the stream
/// ends the watch.
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<()>,
    _guard: Box<dyn Send>,
}

impl ChangeStream {
    pub fn new(rx: mpsc::UnboundedReceiver<()>, guard: impl Send + 'static) -> Self {
        Self {
            rx,
            _guard: Box::new(guard),
        }
    }

    /// Wait up to `wait` for a change, coalescing everything already queued
    pub async fn next_burst(&mut self, wait: Duration) -> Burst {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Err(_) => Burst::Quiet,
            Ok(None) => Burst::Closed,
            Ok(Some(())) => {
                while self.rx.try_recv().is_ok() {}
                Burst::Changed
            }
        }
    }
}

/// Capability to watch one directory for changes
pub trait WatchSource: Send + Sync {
    fn watch(&self, dir: &Path) -> Result<ChangeStream, WatchError>;
}

/// Watch source backed by the platform notifier (inotify on Linux)
#[derive(Debug, Clone, Default)]
pub struct NotifyWatchSource;

impl WatchSource for NotifyWatchSource {
    fn watch(&self, dir: &Path) -> Result<ChangeStream, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_relevant(&event.kind) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!("Watch error: {}", e),
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(ChangeStream::new(rx, watcher))
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Identity of the watched directory
fn dir_inode(dir: &Path) -> Option<u64> {
    std::fs::symlink_metadata(dir)
        .ok()
        .filter(|m| m.is_dir())
        .map(|m| m.ino())
}

/// Watches the trigger directory and hands every burst to the dispatcher
pub struct TriggerWatcher {
    dir: PathBuf,
    source: Arc<dyn WatchSource>,
    dispatcher: Dispatcher,
    poll: Duration,
}

impl TriggerWatcher {
    pub fn new(dir: impl Into<PathBuf>, source: Arc<dyn WatchSource>, dispatcher: Dispatcher) -> Self {
        Self {
            dir: dir.into(),
            source,
            dispatcher,
            poll: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Run until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            let inode = loop {
                if let Some(inode) = dir_inode(&self.dir) {
                    break inode;
                }
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(self.poll) => {}
                }
            };

            let mut stream = match self.source.watch(&self.dir) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot watch {}: {}", self.dir.display(), e);
                    tokio::select! {
                        _ = &mut shutdown => return,
                        _ = tokio::time::sleep(self.poll) => {}
                    }
                    continue;
                }
            };
            info!("Watching {}", self.dir.display());

            // Triggers written while nobody was watching
            self.dispatcher.scan(&self.dir).await;

            loop {
                let burst = tokio::select! {
                    _ = &mut shutdown => return,
                    burst = stream.next_burst(self.poll) => burst,
                };

                match burst {
                    Burst::Changed => {
                        debug!("Change in {}", self.dir.display());
                        self.dispatcher.scan(&self.dir).await;
                    }
                    Burst::Quiet => match dir_inode(&self.dir) {
                        None => {
                            info!("Directory {} removed", self.dir.display());
                            break;
                        }
                        Some(current) if current != inode => {
                            info!("Directory {} replaced", self.dir.display());
                            break;
                        }
                        Some(_) => {}
                    },
                    Burst::Closed => {
                        warn!("Watch on {} ended", self.dir.display());
                        tokio::time::sleep(self.poll).await;
                        break;
                    }
                }
            }
        }
    }
}
