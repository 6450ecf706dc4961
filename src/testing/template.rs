//! Test template types
//!
//! Defines the data structures for deserializing YAML test templates. Fields
//! that are required for expansion default to empty here so that a missing
//! field is reported by validation with its name, not as a parse error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};
use crate::dotnet::DiagTool;

/// Which validation suite a template describes
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Dumps from crashing apps analyzed with the managed dump analyzer
    #[serde(rename = "CrossOSDAC")]
    CrossOsDac,
    /// Dumps and live processes analyzed through the native debugger extension
    #[serde(rename = "DebuggerExtension")]
    DebuggerExtension,
}

impl TestKind {
    pub fn name(self) -> &'static str {
        match self {
            TestKind::CrossOsDac => "CrossOSDAC",
            TestKind::DebuggerExtension => "DebuggerExtension",
        }
    }

    /// Sample apps built for every run of this kind
    pub fn app_names(self) -> &'static [&'static str] {
        match self {
            TestKind::CrossOsDac => &["oom", "uhe"],
            TestKind::DebuggerExtension => &["nativeaot"],
        }
    }

    /// Tool package installed into every run
    pub fn tool(self) -> DiagTool {
        match self {
            TestKind::CrossOsDac => DiagTool::Dump,
            TestKind::DebuggerExtension => DiagTool::DebuggerExtensions,
        }
    }

    /// Apps are published ahead-of-time instead of built
    pub fn publishes_apps(self) -> bool {
        matches!(self, TestKind::DebuggerExtension)
    }

    /// Run apps with the runtime stress log enabled
    pub fn uses_stress_log(self) -> bool {
        matches!(self, TestKind::DebuggerExtension)
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared test template loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct TestTemplate {
    /// Test identity and location
    pub test: TestSection,
    /// SDK versions to run, in order
    #[serde(default)]
    pub sdk_versions: Vec<String>,
    /// Diagnostic tool installed into every run
    #[serde(default)]
    pub tool: ToolSetting,
    /// Sample app settings
    #[serde(default)]
    pub app: AppSection,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestSection {
    pub kind: TestKind,
    /// Root directory holding SDKs, tools and results
    #[serde(default)]
    pub testbed: PathBuf,
}

/// Where to install a diagnostic tool from
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ToolSetting {
    #[serde(default)]
    pub version: String,
    /// Package feed URL
    #[serde(default)]
    pub feed: String,
    /// NuGet config passed to `dotnet tool install --configfile`
    #[serde(default)]
    pub nuget_config: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppSection {
    /// `Debug` or `Release`
    #[serde(default)]
    pub build_config: String,
    /// Replacement `Program.cs` per app name
    #[serde(default)]
    pub sources: BTreeMap<String, PathBuf>,
}

impl TestTemplate {
    /// Parse a template from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a template from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
test:
  kind: CrossOSDAC
  testbed: /tb
sdk_versions: ["8.0", "9.0"]
tool:
  version: 9.0.1
  feed: https://pkgs.example/index.json
app:
  build_config: Release
  sources:
    oom: /src/oom/Program.cs
"#;

    #[test]
    fn test_parse_template() {
        let template = TestTemplate::from_yaml_str(TEMPLATE).unwrap();
        assert_eq!(template.test.kind, TestKind::CrossOsDac);
        assert_eq!(template.test.testbed, PathBuf::from("/tb"));
        assert_eq!(template.sdk_versions, ["8.0", "9.0"]);
        assert_eq!(template.tool.version, "9.0.1");
        assert!(template.tool.nuget_config.is_none());
        assert_eq!(template.app.build_config, "Release");
        assert_eq!(
            template.app.sources.get("oom"),
            Some(&PathBuf::from("/src/oom/Program.cs"))
        );
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let template = TestTemplate::from_yaml_str("test:\n  kind: DebuggerExtension\n").unwrap();
        assert!(template.sdk_versions.is_empty());
        assert!(template.tool.feed.is_empty());
        assert!(template.app.build_config.is_empty());
        assert_eq!(template.test.kind.app_names(), ["nativeaot"]);
    }

    #[test]
    fn test_kind_selects_tool_package() {
        assert_eq!(TestKind::CrossOsDac.tool(), DiagTool::Dump);
        assert_eq!(
            TestKind::DebuggerExtension.tool().package_name(),
            "dotnet-debugger-extensions"
        );
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let err = TestTemplate::from_yaml_str("test:\n  kind: LTTng\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TestTemplate::load(Path::new("/no/such/template.yaml")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
