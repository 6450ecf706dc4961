//! Lazily-produced command pipelines and their invocation log

pub mod log;
mod runner;

pub use runner::{PipelineOutcome, PipelineReport, PipelineRunner};
