//! Managed dump analysis through the `dotnet-dump analyze` REPL
//!
//! Unlike the native debuggers this tool takes no script file. The session is
//! driven over stdin one command at a time and closed with `exit`.

use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::dotnet::{tool_entry_point, DiagTool, Rid};
use crate::process::{CommandSpec, EnvironmentSnapshot, InvocationResult, InvokeOptions, Launcher, ProcessInvoker};

/// Commands run against every dump produced by a campaign
pub const BASE_ANALYSIS_COMMANDS: [&str; 9] = [
    "clrstack",
    "clrstack -i",
    "clrthreads",
    "clrmodules",
    "eeheap",
    "dumpheap",
    "printexception",
    "dso",
    "eeversion",
];

/// Runs `<runtime> <tool.dll> analyze <dump>` and feeds it commands
pub struct DumpAnalyzer<L = ProcessInvoker> {
    runtime: PathBuf,
    tool_entry: PathBuf,
    launcher: L,
}

impl DumpAnalyzer<ProcessInvoker> {
    pub fn new(runtime: impl Into<PathBuf>, tool_entry: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            tool_entry: tool_entry.into(),
            launcher: ProcessInvoker::new(),
        }
    }

    /// Analyzer installed under `tool_root`, run by the runtime of `env`
    pub fn installed(env: &EnvironmentSnapshot, tool_root: &Path, version: &str) -> Result<Self> {
        let runtime = env.runtime_executable(Rid::current())?;
        let entry = tool_entry_point(tool_root, DiagTool::Dump.package_name(), version)?;
        Ok(Self::new(runtime, entry))
    }
}

impl<L: Launcher> DumpAnalyzer<L> {
    pub fn with_launcher<M: Launcher>(self, launcher: M) -> DumpAnalyzer<M> {
        DumpAnalyzer {
            runtime: self.runtime,
            tool_entry: self.tool_entry,
            launcher,
        }
    }

    pub fn tool_entry(&self) -> &Path {
        &self.tool_entry
    }

    /// Open `dump` and run `commands` in order, then `exit`
    pub async fn analyze(
        &self,
        env: &EnvironmentSnapshot,
        working_dir: &Path,
        dump: &Path,
        commands: &[String],
        echo: bool,
    ) -> InvocationResult {
        let spec = CommandSpec::new(&self.runtime, env.clone())
            .arg(self.tool_entry.to_string_lossy())
            .arg("analyze")
            .arg(dump.to_string_lossy())
            .working_dir(working_dir);

        tracing::info!("Analyzing {} ({} commands)", dump.display(), commands.len());
        self.launcher
            .invoke_interactive(&spec, InvokeOptions::captured().with_echo(echo), commands)
            .await
    }
}

/// [`BASE_ANALYSIS_COMMANDS`] as owned strings
pub fn base_commands() -> Vec<String> {
    BASE_ANALYSIS_COMMANDS.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugging::adapter::tests::RecordingLauncher;

    #[tokio::test]
    async fn test_analyze_drives_repl() {
        let analyzer = DumpAnalyzer::new("/sdk/dotnet", "/tools/dotnet-dump.dll")
            .with_launcher(RecordingLauncher::default());
        let commands = base_commands();
        let result = analyzer
            .analyze(
                &EnvironmentSnapshot::new(),
                Path::new("/work"),
                Path::new("/dumps/oom-linux-x64.dmp"),
                &commands,
                false,
            )
            .await;

        assert_eq!(
            result.command,
            "/sdk/dotnet /tools/dotnet-dump.dll analyze /dumps/oom-linux-x64.dmp"
        );
        let calls = analyzer.launcher.calls();
        let (spec, opts, input) = &calls[0];
        assert!(opts.capture);
        assert_eq!(spec.cwd(), Some(Path::new("/work")));
        assert_eq!(input.as_ref().unwrap(), &commands);
    }

    #[test]
    fn test_installed_needs_tool_layout() {
        let root = tempfile::tempdir().unwrap();
        let env = EnvironmentSnapshot::new().with_runtime_root(Path::new("/sdk"));
        assert!(DumpAnalyzer::installed(&env, root.path(), "9.0.1").is_err());

        let any = root
            .path()
            .join(".store/dotnet-dump/9.0.1/dotnet-dump/9.0.1/tools/net8.0/any");
        std::fs::create_dir_all(&any).unwrap();
        std::fs::write(any.join("dotnet-dump.dll"), b"").unwrap();
        let analyzer = DumpAnalyzer::installed(&env, root.path(), "9.0.1").unwrap();
        assert_eq!(analyzer.tool_entry(), any.join("dotnet-dump.dll"));
    }

    #[test]
    fn test_base_commands() {
        let cmds = base_commands();
        assert_eq!(cmds.first().map(String::as_str), Some("clrstack"));
        assert_eq!(cmds.len(), 9);
    }
}
