//! Sample target applications
//!
//! A [`TargetApp`] knows where its project lives and how to create, build and
//! publish it with the runtime from its environment snapshot. Build outputs
//! land at `<root>/bin/<config>/<framework>/<rid>[/publish]/<name>[.exe]`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use super::Rid;
use crate::common::{Error, Result};
use crate::process::{CommandSpec, EnvironmentSnapshot};

/// Build configuration passed to `dotnet build/publish -c`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildConfig {
    Debug,
    Release,
}

impl BuildConfig {
    pub const NAMES: [&'static str; 2] = ["Debug", "Release"];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildConfig::Debug => "Debug",
            BuildConfig::Release => "Release",
        }
    }
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Debug" => Ok(BuildConfig::Debug),
            "Release" => Ok(BuildConfig::Release),
            other => Err(Error::invalid_field(
                "app.build_config",
                other,
                &BuildConfig::NAMES,
            )),
        }
    }
}

/// Descriptor of one sample application bound to a run configuration
#[derive(Debug, Clone, Serialize)]
pub struct TargetApp {
    /// Project and assembly name
    pub name: String,
    /// `dotnet new` template, e.g. `console`
    pub template: String,
    /// Project directory
    pub root: PathBuf,
    /// Environment used for every command touching this app
    #[serde(skip)]
    pub env: EnvironmentSnapshot,
}

impl TargetApp {
    pub fn new(
        env: EnvironmentSnapshot,
        template: impl Into<String>,
        root: impl Into<PathBuf>,
        name: Option<&str>,
    ) -> Self {
        let root = root.into();
        let name = match name {
            Some(n) => n.to_string(),
            None => root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        Self {
            name,
            template: template.into(),
            root,
            env,
        }
    }

    fn runtime(&self) -> Result<PathBuf> {
        self.env.runtime_executable(Rid::current())
    }

    /// `dotnet new <template> -o <root> -n <name> --force`
    pub fn create_spec(&self) -> Result<CommandSpec> {
        Ok(CommandSpec::new(self.runtime()?, self.env.clone()).args([
            "new".to_string(),
            self.template.clone(),
            "-o".to_string(),
            self.root.to_string_lossy().into_owned(),
            "-n".to_string(),
            self.name.clone(),
            "--force".to_string(),
        ]))
    }

    /// `dotnet build -r <rid> -c <config>` inside the project directory
    pub fn build_spec(&self, config: BuildConfig, rid: Rid) -> Result<CommandSpec> {
        Ok(CommandSpec::new(self.runtime()?, self.env.clone())
            .args(["build", "-r", rid.as_str(), "-c", config.as_str()])
            .working_dir(&self.root))
    }

    /// `dotnet publish -r <rid> -c <config>` inside the project directory
    pub fn publish_spec(&self, config: BuildConfig, rid: Rid) -> Result<CommandSpec> {
        Ok(CommandSpec::new(self.runtime()?, self.env.clone())
            .args(["publish", "-r", rid.as_str(), "-c", config.as_str()])
            .working_dir(&self.root))
    }

    /// Directory holding build (or publish) outputs
    pub fn output_folder(
        &self,
        config: BuildConfig,
        framework: &str,
        rid: Rid,
        published: bool,
    ) -> PathBuf {
        let dir = self
            .root
            .join("bin")
            .join(config.as_str())
            .join(framework)
            .join(rid.as_str());
        if published {
            dir.join("publish")
        } else {
            dir
        }
    }

    /// Expected executable path, without checking that it exists
    pub fn executable_path(
        &self,
        config: BuildConfig,
        framework: &str,
        rid: Rid,
        published: bool,
    ) -> PathBuf {
        self.output_folder(config, framework, rid, published)
            .join(format!("{}{}", self.name, rid.executable_extension()))
    }

    /// Built executable; errors if the build did not produce it
    pub fn executable(
        &self,
        config: BuildConfig,
        framework: &str,
        rid: Rid,
        published: bool,
    ) -> Result<PathBuf> {
        let exe = self.executable_path(config, framework, rid, published);
        ensure_exists(&exe)?;
        Ok(exe)
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::AppArtifactMissing(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RUNTIME_ROOT_VAR;

    fn app(root: &Path) -> TargetApp {
        let env: EnvironmentSnapshot = [(RUNTIME_ROOT_VAR, "/sdk")].into_iter().collect();
        TargetApp::new(env, "console", root, None)
    }

    #[test]
    fn test_build_config_parse() {
        assert_eq!("Release".parse::<BuildConfig>().unwrap(), BuildConfig::Release);
        let err = "release".parse::<BuildConfig>().unwrap_err();
        assert!(err.to_string().contains("Debug, Release"));
    }

    #[test]
    fn test_name_defaults_to_root_dir() {
        let app = app(Path::new("/tb/TargetApps/oom-sdk8.0"));
        assert_eq!(app.name, "oom-sdk8.0");
        assert_eq!(app.root, PathBuf::from("/tb/TargetApps/oom-sdk8.0"));
    }

    #[test]
    fn test_executable_path_layout() {
        let app = app(Path::new("/apps/uhe"));
        assert_eq!(
            app.executable_path(BuildConfig::Debug, "net8.0", Rid::LinuxX64, false),
            PathBuf::from("/apps/uhe/bin/Debug/net8.0/linux-x64/uhe")
        );
        assert_eq!(
            app.executable_path(BuildConfig::Release, "net9.0", Rid::WinX64, true),
            PathBuf::from("/apps/uhe/bin/Release/net9.0/win-x64/publish/uhe.exe")
        );
    }

    #[test]
    fn test_missing_executable_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let err = app
            .executable(BuildConfig::Debug, "net8.0", Rid::LinuxX64, false)
            .unwrap_err();
        assert!(matches!(err, Error::AppArtifactMissing(_)));
    }

    #[test]
    fn test_build_spec_runs_in_app_root() {
        let app = app(Path::new("/apps/console"));
        let spec = app.build_spec(BuildConfig::Release, Rid::LinuxArm64).unwrap();
        assert_eq!(spec.arguments(), ["build", "-r", "linux-arm64", "-c", "Release"]);
        assert_eq!(spec.cwd(), Some(Path::new("/apps/console")));
        assert!(spec.program().starts_with("/sdk"));
    }

    #[test]
    fn test_publish_spec() {
        let app = app(Path::new("/apps/nativeaot"));
        let spec = app.publish_spec(BuildConfig::Debug, Rid::WinX64).unwrap();
        assert_eq!(spec.arguments(), ["publish", "-r", "win-x64", "-c", "Debug"]);
        assert_eq!(spec.cwd(), Some(Path::new("/apps/nativeaot")));
    }

    #[test]
    fn test_create_spec() {
        let app = app(Path::new("/apps/console"));
        let spec = app.create_spec().unwrap();
        assert_eq!(
            spec.arguments(),
            ["new", "console", "-o", "/apps/console", "-n", "console", "--force"]
        );
        assert!(spec.cwd().is_none());
    }
}
