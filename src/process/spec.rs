//! Command descriptions and invocation results

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::EnvironmentSnapshot;
use crate::common::render_command_line;

/// One external invocation to perform
///
/// Built with the consuming builder methods and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: EnvironmentSnapshot,
    working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, env: EnvironmentSnapshot) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env,
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`; an empty path means "inherit the parent's"
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.working_dir = if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir)
        };
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &EnvironmentSnapshot {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Display form used in logs and progress lines
    pub fn command_line(&self) -> String {
        render_command_line(&self.program.to_string_lossy(), &self.args)
    }
}

/// Why an invocation did not produce a normal result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCause {
    /// Top-level error message
    pub message: String,
    /// Messages of the `source()` chain, outermost first
    pub chain: Vec<String>,
    /// Captured backtrace, when backtraces are enabled
    pub backtrace: Option<String>,
}

impl FailureCause {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chain: Vec::new(),
            backtrace: None,
        }
    }

    /// Capture an error and its cause chain
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        let bt = std::backtrace::Backtrace::capture();
        let backtrace = match bt.status() {
            std::backtrace::BacktraceStatus::Captured => Some(bt.to_string()),
            _ => None,
        };

        Self {
            message: err.to_string(),
            chain,
            backtrace,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.chain {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// Outcome of one [`CommandSpec`]
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// Rendered command line
    pub command: String,
    /// Everything the child wrote to stdout, one `\n`-terminated line per line read
    pub stdout: String,
    /// Everything the child wrote to stderr, same layout as `stdout`
    pub stderr: String,
    /// Process id; `None` when no process was started
    pub pid: Option<u32>,
    /// Exit code, when the child exited normally
    pub exit_code: Option<i32>,
    /// Set when the invocation could not run to completion
    pub failure: Option<FailureCause>,
}

impl InvocationResult {
    /// Result for a process that never started
    pub fn not_started(command: String, cause: FailureCause) -> Self {
        Self {
            command,
            stdout: String::new(),
            stderr: String::new(),
            pid: None,
            exit_code: None,
            failure: Some(cause),
        }
    }

    /// Whether a pipeline should treat this step as failed
    ///
    /// Any stderr output counts, even warnings; exit codes are not consulted.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some() || !self.stderr.is_empty()
    }
}
