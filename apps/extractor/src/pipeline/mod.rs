//! Batch processing: folder discovery and the run orchestrator.

pub mod discovery;
pub mod orchestrator;

pub use orchestrator::{run_until, RunRequest, RunSummary};
