//! Diagnostics validation runner
//!
//! Process orchestration for validating diagnostic tooling: spawning tools
//! with captured output, sequencing lazy multi-step pipelines into append-only
//! logs, and driving command-line debuggers and dump analyzers through
//! scripted sessions.

pub mod cli;
pub mod commands;
pub mod common;
pub mod debugging;
pub mod dotnet;
pub mod pipeline;
pub mod process;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use process::{CommandSpec, EnvironmentSnapshot, InvocationResult, InvokeOptions, ProcessInvoker};
