//! Line streaming from container processes
//!
//! Output of a running container is forwarded line by line to an
//! [`OutputSink`] as it arrives, so a hung or very chatty step still
//! produces live log lines. The full text is returned once both streams
//! close.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// Callback for output lines as they arrive
///
/// This trait is object-safe and can be used as `&dyn OutputSink`.
pub trait OutputSink: Send + Sync {
    /// Called once per output line, without the trailing newline
    fn on_line(&self, line: &str);
}

/// Sink that discards everything
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl OutputSink for NoopSink {
    fn on_line(&self, _line: &str) {}
}

/// Forward lines from `stdout` and `stderr` to `sink` as they arrive
///
/// Both streams are read concurrently. Returns the combined output.
pub async fn pump_lines<O, E>(stdout: Option<O>, stderr: Option<E>, sink: &dyn OutputSink) -> String
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = stdout {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = stderr {
        spawn_reader(stderr, tx.clone());
    }
    drop(tx);

    let mut captured = String::new();
    while let Some(line) = rx.recv().await {
        sink.on_line(&line);
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

fn spawn_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read process output: {}", e);
                    break;
                }
            }
        }
    });
}
