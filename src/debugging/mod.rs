//! Scripted debugger sessions
//!
//! Native debuggers are driven in batch mode with a generated script file;
//! the managed dump analyzer is driven as a REPL over stdin.

mod adapter;
mod analyzer;
mod script;
mod target;

pub use adapter::{CliDebugger, DebugSession};
pub use analyzer::{base_commands, DumpAnalyzer, BASE_ANALYSIS_COMMANDS};
pub use script::DebugScript;
pub use target::{render_arguments, DebugTarget};
