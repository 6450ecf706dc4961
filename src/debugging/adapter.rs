//! Batch-script sessions against a native command-line debugger

use std::path::{Path, PathBuf};

use super::script::{quit_command, DebugScript};
use super::target::{render_arguments, DebugTarget};
use crate::common::config::Settings;
use crate::common::{Error, Result};
use crate::dotnet::Platform;
use crate::process::{CommandSpec, EnvironmentSnapshot, InvocationResult, InvokeOptions, Launcher, ProcessInvoker};

/// Per-call session settings shared by the three debugging modes
#[derive(Debug, Clone)]
pub struct DebugSession {
    /// Environment handed to the debugger
    pub env: EnvironmentSnapshot,
    /// Working directory; empty to inherit
    pub working_dir: PathBuf,
    /// Where the rendered script is written before the debugger starts
    pub script_path: PathBuf,
    /// Echo debugger output live as well as capturing it
    pub echo: bool,
    /// Extra lines written to the debugger's stdin after it starts,
    /// followed by the platform's quit command
    pub input: Vec<String>,
}

impl DebugSession {
    pub fn new(env: EnvironmentSnapshot, script_path: impl Into<PathBuf>) -> Self {
        Self {
            env,
            working_dir: PathBuf::new(),
            script_path: script_path.into(),
            echo: false,
            input: Vec::new(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn input(mut self, lines: Vec<String>) -> Self {
        self.input = lines;
        self
    }
}

/// A command-line debugger (`cdb` on Windows, `lldb` elsewhere)
pub struct CliDebugger<L = ProcessInvoker> {
    path: PathBuf,
    platform: Platform,
    launcher: L,
}

impl CliDebugger<ProcessInvoker> {
    pub fn new(path: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            path: path.into(),
            platform,
            launcher: ProcessInvoker::new(),
        }
    }

    /// Debugger from the settings, looked up on `PATH` unless configured explicitly
    pub fn from_settings(settings: &Settings, platform: Platform) -> Result<Self> {
        let path = settings.debugger_path().ok_or_else(|| {
            Error::missing_field(
                "debuggers.path",
                &format!(
                    "none of [{}] found on PATH; set the debugger path in the settings",
                    settings.debuggers.search.join(", ")
                ),
            )
        })?;
        Ok(Self::new(path, platform)
            .with_launcher(ProcessInvoker::new().with_teardown_grace(settings.timeouts.teardown_grace())))
    }
}

impl<L: Launcher> CliDebugger<L> {
    /// Swap the launcher used to run the debugger
    pub fn with_launcher<M: Launcher>(self, launcher: M) -> CliDebugger<M> {
        CliDebugger {
            path: self.path,
            platform: self.platform,
            launcher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Open a crash dump and run the script against it
    pub async fn debug_dump(
        &self,
        dump: &Path,
        script: &DebugScript,
        session: &DebugSession,
    ) -> Result<InvocationResult> {
        self.debug(&DebugTarget::Dump(dump.to_path_buf()), script, session)
            .await
    }

    /// Attach to a running process and run the script
    pub async fn debug_attach(
        &self,
        pid: u32,
        script: &DebugScript,
        session: &DebugSession,
    ) -> Result<InvocationResult> {
        self.debug(&DebugTarget::Process(pid), script, session).await
    }

    /// Start `launchable` under the debugger and run the script
    pub async fn debug_launch(
        &self,
        launchable: &Path,
        script: &DebugScript,
        session: &DebugSession,
    ) -> Result<InvocationResult> {
        self.debug(&DebugTarget::Launch(launchable.to_path_buf()), script, session)
            .await
    }

    /// Run one debugger session
    ///
    /// Errors are returned only for sessions rejected before the debugger is
    /// started: a script rendered for another platform, or a target that does
    /// not exist. Anything that goes wrong once the debugger runs is in the
    /// returned result.
    pub async fn debug(
        &self,
        target: &DebugTarget,
        script: &DebugScript,
        session: &DebugSession,
    ) -> Result<InvocationResult> {
        if script.platform() != self.platform {
            return Err(Error::platform_mismatch(script.platform(), self.platform));
        }
        check_target(target)?;

        let script_path = script.write_to(&session.script_path).await?;
        let spec = CommandSpec::new(&self.path, session.env.clone())
            .args(render_arguments(self.platform, target, &script_path))
            .working_dir(&session.working_dir);

        tracing::info!("Debugging {} with {}", target, self.path.display());
        let opts = InvokeOptions::captured()
            .with_echo(session.echo)
            .with_terminal_command(quit_command(self.platform));
        let result = if session.input.is_empty() {
            self.launcher.invoke(&spec, opts).await
        } else {
            self.launcher
                .invoke_interactive(&spec, opts, &session.input)
                .await
        };
        Ok(result)
    }
}

fn check_target(target: &DebugTarget) -> Result<()> {
    match target {
        DebugTarget::Dump(path) | DebugTarget::Launch(path) => {
            if !path.exists() {
                return Err(Error::InvalidTarget(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }
        DebugTarget::Process(pid) => {
            if !process_exists(*pid) {
                return Err(Error::InvalidTarget(format!(
                    "Process with PID {} not found or not accessible",
                    pid
                )));
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 tests process existence without side effects
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    true
}
