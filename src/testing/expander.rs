//! Expansion of a test template into concrete run configurations
//!
//! One configuration per SDK version; on Windows one per SDK version and
//! test RID, in the fixed order of [`WINDOWS_TEST_RIDS`]. Every derived path
//! and name carries the same `-<rid>` suffix so that runs never share output.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::template::{TestKind, TestTemplate, ToolSetting};
use crate::common::{Error, Result};
use crate::dotnet::{target_framework, BuildConfig, Platform, Rid, TargetApp, WINDOWS_TEST_RIDS};
use crate::process::EnvironmentSnapshot;

/// One fully-resolved test run
#[derive(Debug, Clone, Serialize)]
pub struct RunConfiguration {
    pub test_name: String,
    pub kind: TestKind,
    pub sdk_version: String,
    /// Target RID when the run is pinned to one (Windows runs)
    pub rid: Option<Rid>,
    pub testbed: PathBuf,
    pub result_root: PathBuf,
    pub dump_folder: PathBuf,
    pub analysis_folder: PathBuf,
    pub build_folder: PathBuf,
    pub sdk_root: PathBuf,
    pub tool_root: PathBuf,
    pub tool: ToolSetting,
    pub build_config: BuildConfig,
    pub apps: Vec<TargetApp>,
    /// Replacement `Program.cs` per app name, copied in before building
    pub app_sources: BTreeMap<String, PathBuf>,
    /// Environment for every invocation of this run, `DOTNET_ROOT` set to `sdk_root`
    #[serde(skip)]
    pub env: EnvironmentSnapshot,
}

impl RunConfiguration {
    /// RID the apps are built for and dumps are named after
    pub fn target_rid(&self) -> Rid {
        self.rid.unwrap_or_else(Rid::current)
    }

    pub fn framework(&self) -> String {
        target_framework(&self.sdk_version)
    }

    fn suffix(&self) -> String {
        rid_suffix(self.rid)
    }

    /// Log for the install/build and dump-generation pipelines
    pub fn init_log_path(&self) -> PathBuf {
        self.result_root
            .join(format!("Initialization-{}{}.log", self.sdk_version, self.suffix()))
    }

    /// Environment activation script written next to the SDK
    pub fn activation_script_path(&self) -> PathBuf {
        let ext = EnvironmentSnapshot::activation_script_extension(self.target_rid());
        self.testbed.join(format!(
            "env_activation-sdk{}{}.{}",
            self.sdk_version,
            self.suffix(),
            ext
        ))
    }
}

fn rid_suffix(rid: Option<Rid>) -> String {
    rid.map(|r| format!("-{}", r.as_str())).unwrap_or_default()
}

/// Check required fields before anything is derived from them
fn validate(template: &TestTemplate) -> Result<BuildConfig> {
    if template.test.testbed.as_os_str().is_empty() {
        return Err(Error::missing_field(
            "test.testbed",
            "set the directory that holds SDKs, tools and results",
        ));
    }
    if template.sdk_versions.is_empty() {
        return Err(Error::missing_field(
            "sdk_versions",
            "list at least one SDK version",
        ));
    }
    if let Some(pos) = template.sdk_versions.iter().position(|v| v.trim().is_empty()) {
        return Err(Error::missing_field(
            &format!("sdk_versions[{}]", pos),
            "SDK versions must not be empty",
        ));
    }
    if template.tool.version.is_empty() {
        return Err(Error::missing_field("tool.version", "set the tool version to install"));
    }
    if template.tool.feed.is_empty() {
        return Err(Error::missing_field("tool.feed", "set the tool install feed"));
    }
    if template.app.build_config.is_empty() {
        return Err(Error::missing_field(
            "app.build_config",
            "set Debug or Release",
        ));
    }
    template.app.build_config.parse()
}

/// Expand `template` for `platform`, copying `base_env` into every run
///
/// Fails before deriving anything if a required field is missing or invalid.
pub fn expand(
    template: &TestTemplate,
    platform: Platform,
    base_env: &EnvironmentSnapshot,
) -> Result<Vec<RunConfiguration>> {
    let build_config = validate(template)?;

    let rids: Vec<Option<Rid>> = match platform {
        Platform::Windows => WINDOWS_TEST_RIDS.iter().copied().map(Some).collect(),
        Platform::Unix => vec![None],
    };

    let mut configs = Vec::with_capacity(template.sdk_versions.len() * rids.len());
    for version in &template.sdk_versions {
        for rid in &rids {
            configs.push(expand_one(template, build_config, version, *rid, base_env));
        }
    }

    tracing::debug!(
        "Expanded {} template into {} run configurations",
        template.test.kind,
        configs.len()
    );
    Ok(configs)
}

/// Expand for the host platform with the current process environment
pub fn expand_for_current_host(template: &TestTemplate) -> Result<Vec<RunConfiguration>> {
    expand(template, Platform::current(), &EnvironmentSnapshot::from_process())
}

fn expand_one(
    template: &TestTemplate,
    build_config: BuildConfig,
    version: &str,
    rid: Option<Rid>,
    base_env: &EnvironmentSnapshot,
) -> RunConfiguration {
    let kind = template.test.kind;
    let testbed = template.test.testbed.clone();
    let suffix = rid_suffix(rid);
    let result_root = testbed.join("TestResult");

    let sdk_root = testbed.join(format!("DotNetSDK-{}{}", version, suffix));
    let tool_root = testbed.join(format!(
        "{}-{}{}",
        kind.tool().package_name(),
        version,
        suffix
    ));
    let build_folder = result_root.join(format!("apps-sdk{}{}", version, suffix));
    let mut env = base_env.with_runtime_root(&sdk_root);
    env.append_search_path(&sdk_root);

    let apps = kind
        .app_names()
        .iter()
        .map(|name| app(&env, &build_folder, name))
        .collect();

    RunConfiguration {
        test_name: format!("{}-SDK{}{}", kind.name(), version, suffix),
        kind,
        sdk_version: version.to_string(),
        rid,
        dump_folder: result_root.join(format!("dumps-sdk{}{}", version, suffix)),
        analysis_folder: result_root.join(format!("analysis-sdk{}{}", version, suffix)),
        build_folder,
        testbed,
        result_root,
        sdk_root,
        tool_root,
        tool: template.tool.clone(),
        build_config,
        apps,
        app_sources: template.app.sources.clone(),
        env,
    }
}

fn app(env: &EnvironmentSnapshot, build_folder: &Path, name: &str) -> TargetApp {
    TargetApp::new(env.clone(), "console", build_folder.join(name), Some(name))
}
