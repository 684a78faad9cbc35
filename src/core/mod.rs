//! Core domain models
//!
//! Projects, steps and their configuration, the per-run build context and
//! the states a project build moves through.

pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod settings;
pub mod state;
pub mod step;
pub mod workspace;

pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use settings::*;
pub use state::*;
pub use step::*;
pub use workspace::*;
