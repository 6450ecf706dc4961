//! Diagnostic tool catalogue and tool-path resolution

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::process::{CommandSpec, EnvironmentSnapshot};

use super::Rid;

/// Diagnostic tools the runner knows how to exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DiagTool {
    Counters,
    DebuggerExtensions,
    Dump,
    GcDump,
    Sos,
    Stack,
    Trace,
}

impl DiagTool {
    pub const ALL: [DiagTool; 7] = [
        DiagTool::Counters,
        DiagTool::DebuggerExtensions,
        DiagTool::Dump,
        DiagTool::GcDump,
        DiagTool::Sos,
        DiagTool::Stack,
        DiagTool::Trace,
    ];

    /// Package and command name
    pub fn package_name(self) -> &'static str {
        match self {
            DiagTool::Counters => "dotnet-counters",
            DiagTool::DebuggerExtensions => "dotnet-debugger-extensions",
            DiagTool::Dump => "dotnet-dump",
            DiagTool::GcDump => "dotnet-gcdump",
            DiagTool::Sos => "dotnet-sos",
            DiagTool::Stack => "dotnet-stack",
            DiagTool::Trace => "dotnet-trace",
        }
    }

    /// Whether some of the tool's verbs run until stopped (`monitor`, `collect`)
    pub fn has_monitor_mode(self) -> bool {
        matches!(self, DiagTool::Counters | DiagTool::Trace)
    }
}

impl fmt::Display for DiagTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package_name())
    }
}

impl FromStr for DiagTool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DiagTool::ALL
            .iter()
            .copied()
            .find(|t| t.package_name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = DiagTool::ALL.iter().map(|t| t.package_name()).collect();
                Error::invalid_field("tool", s, &names)
            })
    }
}

impl TryFrom<String> for DiagTool {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DiagTool> for String {
    fn from(tool: DiagTool) -> Self {
        tool.package_name().to_string()
    }
}

/// Locate the managed entry point of a tool installed with `--tool-path`
///
/// Layout: `<root>/.store/<name>/<version>/<name>/<version>/tools/net*/any/<name>.dll`.
/// The first `net*` directory in name order is used.
pub fn tool_entry_point(tool_root: &Path, tool_name: &str, version: &str) -> Result<PathBuf> {
    let tools_dir = tool_root
        .join(".store")
        .join(tool_name)
        .join(version)
        .join(tool_name)
        .join(version)
        .join("tools");

    let entries = std::fs::read_dir(&tools_dir).map_err(|e| Error::file_read(&tools_dir, e))?;
    let mut frameworks: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter(|e| e.file_name().to_string_lossy().starts_with("net"))
        .map(|e| e.path())
        .collect();
    frameworks.sort();

    let framework = frameworks
        .into_iter()
        .next()
        .ok_or_else(|| Error::tool_not_found(tool_name, &tools_dir))?;
    let entry = framework.join("any").join(format!("{}.dll", tool_name));
    if !entry.exists() {
        return Err(Error::tool_not_found(tool_name, &framework));
    }
    Ok(entry)
}

/// `dotnet tool install <name> --tool-path <root> --version <v> --add-source <feed>`
pub fn install_spec(
    env: &EnvironmentSnapshot,
    tool_root: &Path,
    feed: &str,
    version: &str,
    tool_name: &str,
    nuget_config: Option<&Path>,
) -> Result<CommandSpec> {
    let runtime = env.runtime_executable(Rid::current())?;
    let mut spec = CommandSpec::new(runtime, env.clone()).args([
        "tool".to_string(),
        "install".to_string(),
        tool_name.to_string(),
        "--tool-path".to_string(),
        tool_root.to_string_lossy().into_owned(),
        "--version".to_string(),
        version.to_string(),
        "--add-source".to_string(),
        feed.to_string(),
    ]);
    if let Some(config) = nuget_config {
        spec = spec.args(["--configfile".to_string(), config.to_string_lossy().into_owned()]);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RUNTIME_ROOT_VAR;

    #[test]
    fn test_tool_names_roundtrip() {
        for tool in DiagTool::ALL {
            assert_eq!(tool.package_name().parse::<DiagTool>().unwrap(), tool);
        }
        assert!("dotnet-monitor".parse::<DiagTool>().is_err());
    }

    #[test]
    fn test_tool_entry_point_picks_first_framework() {
        let root = tempfile::tempdir().unwrap();
        let tools = root
            .path()
            .join(".store/dotnet-dump/9.0.1/dotnet-dump/9.0.1/tools");
        for tfm in ["net8.0", "net6.0"] {
            let any = tools.join(tfm).join("any");
            std::fs::create_dir_all(&any).unwrap();
            std::fs::write(any.join("dotnet-dump.dll"), b"").unwrap();
        }

        let entry = tool_entry_point(root.path(), "dotnet-dump", "9.0.1").unwrap();
        assert_eq!(entry, tools.join("net6.0/any/dotnet-dump.dll"));
    }

    #[test]
    fn test_tool_entry_point_missing() {
        let root = tempfile::tempdir().unwrap();
        let err = tool_entry_point(root.path(), "dotnet-dump", "1.0.0").unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_install_spec() {
        let env: EnvironmentSnapshot = [(RUNTIME_ROOT_VAR, "/sdk")].into_iter().collect();
        let spec = install_spec(
            &env,
            Path::new("/tb/tools"),
            "https://feed/index.json",
            "9.0.1",
            "dotnet-dump",
            None,
        )
        .unwrap();
        assert_eq!(
            spec.arguments(),
            [
                "tool",
                "install",
                "dotnet-dump",
                "--tool-path",
                "/tb/tools",
                "--version",
                "9.0.1",
                "--add-source",
                "https://feed/index.json"
            ]
        );
    }
}
