//! Environment snapshots handed to child processes
//!
//! A snapshot is an owned copy of a variable table. Every child invocation
//! gets its environment from a snapshot instead of the parent's live process
//! environment, and mutating helpers work on the caller's own copy, so two
//! sibling invocations never see each other's overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::common::{Error, Result};
use crate::dotnet::Rid;

/// Variable naming the managed runtime root
pub const RUNTIME_ROOT_VAR: &str = "DOTNET_ROOT";

#[cfg(windows)]
const SEARCH_PATH_VAR: &str = "Path";
#[cfg(not(windows))]
const SEARCH_PATH_VAR: &str = "PATH";

#[cfg(windows)]
const SEARCH_PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const SEARCH_PATH_SEPARATOR: char = ':';

/// Windows variable names are case-insensitive
const SEARCH_PATH_IGNORES_CASE: bool = cfg!(windows);

/// Key under which `vars` keeps the search path
///
/// With `ignore_case` an existing entry spelled differently (`PATH` for
/// `Path`) is reused, so the table never holds two search paths.
fn search_path_key(vars: &BTreeMap<String, String>, ignore_case: bool) -> String {
    vars.keys()
        .find(|key| {
            if ignore_case {
                key.eq_ignore_ascii_case(SEARCH_PATH_VAR)
            } else {
                key.as_str() == SEARCH_PATH_VAR
            }
        })
        .cloned()
        .unwrap_or_else(|| SEARCH_PATH_VAR.to_string())
}

/// Variable table used for every child invocation of one run configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current process environment
    ///
    /// This is the only place the runner reads the parent's environment.
    /// Variables that are not valid Unicode are skipped. A search-path entry
    /// is always present afterwards, even if the parent had none.
    pub fn from_process() -> Self {
        let mut vars: BTreeMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let key = search_path_key(&vars, SEARCH_PATH_IGNORES_CASE);
        vars.entry(key).or_default();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Copy of this snapshot with the runtime root overridden
    pub fn with_runtime_root(&self, root: &Path) -> Self {
        let mut env = self.clone();
        env.set(RUNTIME_ROOT_VAR, root.to_string_lossy());
        env
    }

    /// The resolved runtime root, if set
    pub fn runtime_root(&self) -> Option<PathBuf> {
        self.get(RUNTIME_ROOT_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Path of the runtime host executable under the runtime root
    pub fn runtime_executable(&self, rid: Rid) -> Result<PathBuf> {
        let root = self.runtime_root().ok_or_else(|| {
            Error::missing_field(
                RUNTIME_ROOT_VAR,
                "the environment snapshot has no runtime root; expand the run configuration first",
            )
        })?;
        Ok(root.join(format!("dotnet{}", rid.executable_extension())))
    }

    /// Append a directory to the executable search path
    pub fn append_search_path(&mut self, dir: &Path) {
        let key = search_path_key(&self.vars, SEARCH_PATH_IGNORES_CASE);
        let entry = self.vars.entry(key).or_default();
        if !entry.is_empty() {
            entry.push(SEARCH_PATH_SEPARATOR);
        }
        entry.push_str(&dir.to_string_lossy());
    }

    /// Make the runtime write a full dump to `dump_path` when the process crashes
    pub fn enable_dump_generation(&mut self, dump_path: &Path) {
        self.set("DOTNET_DbgEnableMiniDump", "1");
        self.set("DOTNET_DbgMiniDumpType", "4");
        self.set("DOTNET_DbgMiniDumpName", dump_path.to_string_lossy());
    }

    /// Enable the in-memory stress log
    pub fn enable_stress_log(&mut self) {
        self.set("DOTNET_StressLog", "1");
        self.set("DOTNET_StressLogLevel", "10");
        self.set("DOTNET_TotalStressLogSize", "8196");
    }

    /// Render a shell script that activates this runtime in a terminal
    ///
    /// Windows RIDs get PowerShell syntax, all others POSIX sh.
    pub fn activation_script(&self, rid: Rid, tool_root: Option<&Path>) -> Result<String> {
        let root = self
            .runtime_root()
            .ok_or_else(|| Error::missing_field(RUNTIME_ROOT_VAR, "runtime root is not set"))?;
        let root = root.display();
        let mut lines = Vec::new();
        if rid.platform().is_windows() {
            lines.push(format!("$Env:DOTNET_ROOT=\"{root}\""));
            lines.push(format!("$Env:Path+=\";{root}\""));
            if let Some(tool_root) = tool_root {
                lines.push(format!("$Env:Path+=\";{}\"", tool_root.display()));
            }
        } else {
            lines.push(format!("export DOTNET_ROOT={root}"));
            lines.push(format!("export PATH=$PATH:{root}"));
            if let Some(tool_root) = tool_root {
                lines.push(format!("export PATH=$PATH:{}", tool_root.display()));
            }
        }
        let mut script = lines.join("\n");
        script.push('\n');
        Ok(script)
    }

    /// Script file extension matching [`Self::activation_script`]
    pub fn activation_script_extension(rid: Rid) -> &'static str {
        if rid.platform().is_windows() {
            "ps1"
        } else {
            "sh"
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
