//! Settings file handling
//!
//! Runner-wide knobs that are not part of a test template: how long monitor
//! tools are left running, how long to wait for output readers after a
//! forced stop, and which debugger names to look up on `PATH`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main settings structure
#[derive(Debug, Deserialize, Default)]
pub struct Settings {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Console output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Debugger lookup settings
    #[serde(default)]
    pub debuggers: DebuggerConfig,
}

/// Timeout settings
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// How long a monitor-style tool runs before it is stopped
    #[serde(default = "default_monitor_secs")]
    pub monitor_secs: u64,

    /// Upper bound on draining output readers after a forced stop
    #[serde(default = "default_teardown_ms")]
    pub teardown_grace_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            monitor_secs: default_monitor_secs(),
            teardown_grace_ms: default_teardown_ms(),
        }
    }
}

impl Timeouts {
    pub fn monitor(&self) -> Duration {
        Duration::from_secs(self.monitor_secs)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

fn default_monitor_secs() -> u64 {
    5
}
fn default_teardown_ms() -> u64 {
    2_000
}

/// Console output settings
#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    /// Echo child output lines to the console as they arrive
    #[serde(default)]
    pub echo: bool,
}

/// Debugger lookup settings
#[derive(Debug, Deserialize)]
pub struct DebuggerConfig {
    /// Explicit path to the native debugger; wins over `PATH` lookup
    pub path: Option<PathBuf>,

    /// Managed debugging extension loaded by Windows debuggers
    pub extension: Option<PathBuf>,

    /// Names tried on `PATH` when no explicit path is set
    #[serde(default = "default_debugger_names")]
    pub search: Vec<String>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            path: None,
            extension: None,
            search: default_debugger_names(),
        }
    }
}

fn default_debugger_names() -> Vec<String> {
    if cfg!(windows) {
        vec!["cdb".to_string()]
    } else {
        vec!["lldb".to_string()]
    }
}

impl Settings {
    /// Load settings from the default settings file
    ///
    /// Returns default settings if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| super::Error::file_read(&path, e))?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Resolve the native debugger executable
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn debugger_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.debuggers.path {
            return Some(path.clone());
        }
        self.debuggers
            .search
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}
