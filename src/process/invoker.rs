//! Child process invocation with concurrent output capture
//!
//! Each invocation owns its child. Two reader tasks drain stdout and stderr
//! line by line into separate buffers while the caller waits for exit. The
//! child is spawned with `kill_on_drop`, so no process handle survives the
//! call on any path out of it. Timed invocations also start the child in its
//! own process group on unix and stop the whole group, so tools that fork
//! helpers do not leave them running.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::spec::{CommandSpec, FailureCause, InvocationResult};
use crate::common::Error;

/// Default upper bound on draining readers after a forced stop
const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Default command that ends an interactive session
pub const TERMINAL_COMMAND: &str = "exit";

/// How child output is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Capture stdout/stderr into the result; otherwise inherit the parent's streams
    pub capture: bool,
    /// Also print captured lines to the console as they arrive
    pub echo: bool,
    /// Last line written by interactive invocations
    pub terminal_command: &'static str,
}

impl InvokeOptions {
    /// Capture output without echoing it
    pub fn captured() -> Self {
        Self {
            capture: true,
            echo: false,
            terminal_command: TERMINAL_COMMAND,
        }
    }

    /// Let the child write straight to the console
    pub fn inherited() -> Self {
        Self {
            capture: false,
            echo: false,
            terminal_command: TERMINAL_COMMAND,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Replace the line that ends interactive sessions
    pub fn with_terminal_command(mut self, command: &'static str) -> Self {
        self.terminal_command = command;
        self
    }
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self::captured()
    }
}

/// Something that can run a [`CommandSpec`] to completion
///
/// [`ProcessInvoker`] is the real implementation; the debugger adapters take
/// any launcher so their argument rendering can be checked without spawning.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn invoke(&self, spec: &CommandSpec, opts: InvokeOptions) -> InvocationResult;

    async fn invoke_interactive(
        &self,
        spec: &CommandSpec,
        opts: InvokeOptions,
        commands: &[String],
    ) -> InvocationResult;
}

/// Append-only text buffer shared between a reader task and the invoker
#[derive(Debug, Clone, Default)]
struct OutputBuffer(Arc<Mutex<String>>);

impl OutputBuffer {
    fn push_line(&self, line: &str) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(line);
        buf.push('\n');
    }

    fn snapshot(&self) -> String {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// A started child plus its reader tasks
struct Running {
    child: Child,
    command: String,
    pid: Option<u32>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    readers: Vec<JoinHandle<()>>,
    /// The child leads its own process group
    #[cfg_attr(not(unix), allow(dead_code))]
    own_group: bool,
}

impl Running {
    /// Kill the child and, when it leads its own group, every descendant
    /// still in that group, then reap the child
    async fn stop(&mut self) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            let pgid = self
                .pid
                .filter(|_| self.own_group)
                .and_then(|pid| libc::pid_t::try_from(pid).ok());
            if let Some(pgid) = pgid {
                // The unreaped leader keeps the group id from being reused
                if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                    return self.child.wait().await;
                }
                tracing::warn!(
                    "Failed to stop process group of '{}': {}",
                    self.command,
                    std::io::Error::last_os_error()
                );
            }
        }
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to stop '{}': {}", self.command, e);
        }
        self.child.wait().await
    }

    /// Wait for every reader to reach end of stream
    async fn drain(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
    }

    /// Wait for readers, giving up after `grace`
    ///
    /// A grandchild that inherited the pipes can keep them open after the
    /// child is gone; in that case the readers are aborted and whatever they
    /// collected so far is kept.
    async fn drain_within(&mut self, grace: Duration) {
        let readers: Vec<_> = self.readers.drain(..).collect();
        let aborts: Vec<_> = readers.iter().map(|r| r.abort_handle()).collect();
        let joined = tokio::time::timeout(grace, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!(
                "Output readers for '{}' did not finish; keeping partial output",
                self.command
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }

    fn finish(self, status: std::io::Result<ExitStatus>, failure: Option<FailureCause>) -> InvocationResult {
        let (exit_code, failure) = match status {
            Ok(status) => (status.code(), failure),
            Err(e) => {
                let err = Error::StepFailed(format!("waiting for '{}' failed: {}", self.command, e));
                (None, failure.or_else(|| Some(FailureCause::from_error(&err))))
            }
        };
        InvocationResult {
            command: self.command,
            stdout: self.stdout.snapshot(),
            stderr: self.stderr.snapshot(),
            pid: self.pid,
            exit_code,
            failure,
        }
    }
}

/// Spawns external processes and collects their output
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    teardown_grace: Duration,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self {
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
        }
    }

    /// Override how long readers may take to drain after a forced stop
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    /// Run `spec` to completion
    ///
    /// A process that cannot be started yields a result with no pid and the
    /// spawn error as its failure cause; this never returns an error.
    pub async fn invoke(&self, spec: &CommandSpec, opts: InvokeOptions) -> InvocationResult {
        let mut running = match spawn(spec, opts, false, false) {
            Ok(running) => running,
            Err(result) => return result,
        };

        let status = running.child.wait().await;
        running.drain().await;
        running.finish(status, None)
    }

    /// Run a monitor-style tool for `duration`, then stop it
    ///
    /// The forced stop is the expected way these tools end, so the partial
    /// output is returned as a normal result. On unix the stop reaches every
    /// process the tool started. A child that exits on its own before
    /// `duration` is collected immediately.
    pub async fn invoke_with_timeout(
        &self,
        spec: &CommandSpec,
        opts: InvokeOptions,
        duration: Duration,
    ) -> InvocationResult {
        let mut running = match spawn(spec, opts, false, true) {
            Ok(running) => running,
            Err(result) => return result,
        };

        let waited = tokio::time::timeout(duration, running.child.wait()).await;
        let status = match waited {
            Ok(status) => status,
            Err(_) => {
                tracing::debug!("Stopping '{}' after {:?}", running.command, duration);
                running.stop().await
            }
        };

        running.drain_within(self.teardown_grace).await;
        running.finish(status, None)
    }

    /// Drive a line-oriented REPL
    ///
    /// Starts the child with a piped stdin, writes every command followed by
    /// the options' terminal command, flushing after each line, then waits
    /// for exit.
    /// A write failure (the child quit early) is recorded as the failure cause
    /// but the output collected so far is still returned.
    pub async fn invoke_interactive(
        &self,
        spec: &CommandSpec,
        opts: InvokeOptions,
        commands: &[String],
    ) -> InvocationResult {
        let mut running = match spawn(spec, opts, true, false) {
            Ok(running) => running,
            Err(result) => return result,
        };

        let mut failure = None;
        if let Some(mut stdin) = running.child.stdin.take() {
            let lines = commands
                .iter()
                .map(String::as_str)
                .chain([opts.terminal_command]);
            for line in lines {
                tracing::debug!("stdin >>> {}", line);
                let written: std::io::Result<()> = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    let err = Error::StdinWrite {
                        program: spec.program().display().to_string(),
                        source: e,
                    };
                    failure = Some(FailureCause::from_error(&err));
                    break;
                }
            }
            // Dropping stdin closes the pipe so a REPL that ignored the last line still sees EOF
        }

        let status = running.child.wait().await;
        running.drain().await;
        running.finish(status, failure)
    }
}

#[async_trait]
impl Launcher for ProcessInvoker {
    async fn invoke(&self, spec: &CommandSpec, opts: InvokeOptions) -> InvocationResult {
        ProcessInvoker::invoke(self, spec, opts).await
    }

    async fn invoke_interactive(
        &self,
        spec: &CommandSpec,
        opts: InvokeOptions,
        commands: &[String],
    ) -> InvocationResult {
        ProcessInvoker::invoke_interactive(self, spec, opts, commands).await
    }
}

#[async_trait]
impl<T: Launcher + ?Sized> Launcher for &T {
    async fn invoke(&self, spec: &CommandSpec, opts: InvokeOptions) -> InvocationResult {
        (**self).invoke(spec, opts).await
    }

    async fn invoke_interactive(
        &self,
        spec: &CommandSpec,
        opts: InvokeOptions,
        commands: &[String],
    ) -> InvocationResult {
        (**self).invoke_interactive(spec, opts, commands).await
    }
}

/// Start the child described by `spec`
///
/// With `own_group` the child leads a new process group on unix.
fn spawn(
    spec: &CommandSpec,
    opts: InvokeOptions,
    pipe_stdin: bool,
    own_group: bool,
) -> Result<Running, InvocationResult> {
    let command_line = spec.command_line();
    println!("Run command: {}", command_line);
    tracing::debug!("Spawning: {}", command_line);

    let mut cmd = Command::new(spec.program());
    cmd.args(spec.arguments())
        .env_clear()
        .envs(spec.env().iter())
        .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
        .kill_on_drop(true);

    if let Some(dir) = spec.cwd() {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        if own_group {
            cmd.process_group(0);
        }
    }

    if opts.capture {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let err = Error::spawn(spec.program(), e);
            tracing::warn!("{}", err);
            return Err(InvocationResult::not_started(
                command_line,
                FailureCause::from_error(&err),
            ));
        }
    };

    let stdout = OutputBuffer::default();
    let stderr = OutputBuffer::default();
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        readers.push(spawn_reader(out, stdout.clone(), opts.echo));
    }
    if let Some(err) = child.stderr.take() {
        readers.push(spawn_reader(err, stderr.clone(), opts.echo));
    }

    Ok(Running {
        pid: child.id(),
        child,
        command: command_line,
        stdout,
        stderr,
        readers,
        own_group,
    })
}

/// Drain one stream into `buffer`, one line at a time
///
/// Bytes are decoded lossily so a tool printing non-UTF-8 text cannot stop
/// the reader early.
fn spawn_reader<R>(stream: R, buffer: OutputBuffer, echo: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&raw);
                    let line = text.trim_end_matches(['\n', '\r']);
                    if echo {
                        println!("    {}", line);
                    }
                    buffer.push_line(line);
                }
                Err(e) => {
                    tracing::debug!("Output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::EnvironmentSnapshot;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh", EnvironmentSnapshot::from_process()).args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_both_streams_in_order() {
        let invoker = ProcessInvoker::new();
        let spec = sh("echo one; echo two; echo err1 >&2; echo three; echo err2 >&2");
        let result = invoker.invoke(&spec, InvokeOptions::captured()).await;

        assert_eq!(result.stdout, "one\ntwo\nthree\n");
        assert_eq!(result.stderr, "err1\nerr2\n");
        assert!(result.pid.is_some());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_not_an_error() {
        let invoker = ProcessInvoker::new();
        let spec = CommandSpec::new("/definitely/not/here", EnvironmentSnapshot::new());
        let result = invoker.invoke(&spec, InvokeOptions::captured()).await;

        assert!(result.pid.is_none());
        assert!(result.stdout.is_empty());
        let failure = result.failure.expect("spawn failure recorded");
        assert!(failure.message.contains("/definitely/not/here"));
        assert!(result.command.contains("/definitely/not/here"));
    }

    #[tokio::test]
    async fn test_environment_comes_from_snapshot() {
        let mut env = EnvironmentSnapshot::from_process();
        env.set("DIAG_RUNNER_SNAPSHOT_VAR", "from-snapshot");
        let spec = CommandSpec::new("/bin/sh", env).args(["-c", "echo $DIAG_RUNNER_SNAPSHOT_VAR"]);
        let result = ProcessInvoker::new()
            .invoke(&spec, InvokeOptions::captured())
            .await;
        assert_eq!(result.stdout, "from-snapshot\n");
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("pwd").working_dir(dir.path());
        let result = ProcessInvoker::new()
            .invoke(&spec, InvokeOptions::captured())
            .await;
        let expected = dir.path().canonicalize().unwrap();
        let reported = std::path::PathBuf::from(result.stdout.trim_end())
            .canonicalize()
            .unwrap();
        assert_eq!(reported, expected);
    }

    #[tokio::test]
    async fn test_inherited_output_is_not_captured() {
        let spec = sh("true");
        let result = ProcessInvoker::new()
            .invoke(&spec, InvokeOptions::inherited())
            .await;
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_timeout_stops_endless_monitor() {
        let invoker = ProcessInvoker::new().with_teardown_grace(Duration::from_millis(500));
        let spec = sh("echo started; exec sleep 30");
        let start = Instant::now();
        let result = invoker
            .invoke_with_timeout(&spec, InvokeOptions::captured(), Duration::from_millis(300))
            .await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(result.stdout, "started\n");
        assert!(result.failure.is_none());
        assert!(result.pid.is_some());
    }

    #[tokio::test]
    async fn test_timeout_stops_background_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("MARKER");
        let invoker = ProcessInvoker::new().with_teardown_grace(Duration::from_millis(300));
        let spec = sh("echo started; (sleep 1; touch MARKER) & wait").working_dir(dir.path());
        let start = Instant::now();
        let result = invoker
            .invoke_with_timeout(&spec, InvokeOptions::captured(), Duration::from_millis(300))
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(result.stdout, "started\n");
        assert!(result.failure.is_none());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "background job outlived the stop");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_gives_up_on_escaped_pipe_holder() {
        // `setsid` moves the sleeper out of the child's group, so the stop
        // cannot reach it and it keeps stdout open
        let invoker = ProcessInvoker::new().with_teardown_grace(Duration::from_millis(300));
        let spec = sh("echo started; setsid sleep 3 & exec sleep 30");
        let start = Instant::now();
        let result = invoker
            .invoke_with_timeout(&spec, InvokeOptions::captured(), Duration::from_millis(200))
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(result.stdout, "started\n");
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn test_timeout_returns_early_when_child_exits() {
        let spec = sh("echo quick");
        let start = Instant::now();
        let result = ProcessInvoker::new()
            .invoke_with_timeout(&spec, InvokeOptions::captured(), Duration::from_secs(20))
            .await;
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(result.stdout, "quick\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_interactive_sends_commands_then_exit() {
        // Echo every stdin line back and quit on "exit"
        let spec = sh("while read line; do echo \"> $line\"; [ \"$line\" = exit ] && break; done");
        let commands = vec!["clrthreads".to_string(), "dumpheap -stat".to_string()];
        let result = ProcessInvoker::new()
            .invoke_interactive(&spec, InvokeOptions::captured(), &commands)
            .await;

        assert_eq!(result.stdout, "> clrthreads\n> dumpheap -stat\n> exit\n");
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn test_interactive_uses_configured_terminal_command() {
        let spec = sh("while read line; do echo \"> $line\"; [ \"$line\" = qq ] && break; done");
        let commands = vec!["!clrstack".to_string()];
        let opts = InvokeOptions::captured().with_terminal_command("qq");
        let result = ProcessInvoker::new()
            .invoke_interactive(&spec, opts, &commands)
            .await;

        assert_eq!(result.stdout, "> !clrstack\n> qq\n");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_interactive_with_no_commands_still_exits() {
        let spec = sh("read line; echo \"got $line\"");
        let result = ProcessInvoker::new()
            .invoke_interactive(&spec, InvokeOptions::captured(), &[])
            .await;
        assert_eq!(result.stdout, "got exit\n");
    }
}
