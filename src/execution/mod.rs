//! Pipeline execution: the step executor and the per-project build runner

pub mod executor;
pub mod runner;

pub use executor::{PipelineExecutor, StepResult};
pub use runner::{BuildRunner, LOCK_TIMEOUT};
