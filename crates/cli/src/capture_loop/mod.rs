//! Capture loop driven by the `run` command.

mod runner;
mod stats;

pub use runner::{CaptureRunner, RunConfig};
pub use stats::RunStats;
