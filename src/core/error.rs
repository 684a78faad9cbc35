//! Run-level error types

use crate::runtime::RuntimeError;
use crate::source::FetchError;
use thiserror::Error;

/// A step that did not complete
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Name of the failing step
    pub step: String,
    /// Why it failed (exit status or engine error)
    pub reason: String,
    /// Output captured from the container
    pub output: String,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.reason)
    }
}

/// Errors that end a run as Failed
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Step(StepFailure),

    #[error("Container engine error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Name of the failing step, if a step failed
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            BuildError::Step(failure) => Some(&failure.step),
            _ => None,
        }
    }
}
