//! Debugger script rendering
//!
//! Windows debuggers take extension commands prefixed with `!` and need the
//! managed extension loaded explicitly; unix debuggers run the commands as
//! written and only need to be told to quit.

use std::path::{Path, PathBuf};

use crate::common::Result;
use crate::dotnet::Platform;

/// Lines fed to the debugger before the analysis commands on Windows
const WINDOWS_UNLOAD: &str = ".unload sos";
const WINDOWS_DETACH: &str = ".detach";
const WINDOWS_QUIT: &str = "qq";
const UNIX_QUIT: &str = "exit";

/// Command that ends a session of the debugger of `platform`
pub fn quit_command(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => WINDOWS_QUIT,
        Platform::Unix => UNIX_QUIT,
    }
}

/// Ordered debugger commands for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugScript {
    platform: Platform,
    lines: Vec<String>,
}

impl DebugScript {
    /// Render `commands` for the debugger of `platform`
    ///
    /// `extension` is the managed-debugging extension loaded on Windows; it is
    /// not referenced by unix scripts. An empty command list still yields a
    /// complete script.
    pub fn build<S: AsRef<str>>(platform: Platform, extension: &Path, commands: &[S]) -> Self {
        let lines = match platform {
            Platform::Windows => {
                let mut lines = Vec::with_capacity(commands.len() + 4);
                lines.push(WINDOWS_UNLOAD.to_string());
                lines.push(format!(".load {}", extension.display()));
                lines.extend(commands.iter().map(|c| format!("!{}", c.as_ref())));
                lines.push(WINDOWS_DETACH.to_string());
                lines.push(quit_command(platform).to_string());
                lines
            }
            Platform::Unix => {
                let mut lines: Vec<String> =
                    commands.iter().map(|c| c.as_ref().to_string()).collect();
                lines.push(quit_command(platform).to_string());
                lines
            }
        };
        Self { platform, lines }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// File contents: one command per line
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Write the script to `path`, creating parent directories
    pub async fn write_to(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.to_text()).await?;
        tracing::debug!("Wrote {} line debug script to {}", self.lines.len(), path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXT: &str = r"C:\tools\sos\sos.dll";

    #[test]
    fn test_windows_script() {
        let script = DebugScript::build(Platform::Windows, Path::new(EXT), &["clrstack", "dumpheap -stat"]);
        assert_eq!(
            script.lines(),
            [
                ".unload sos",
                r".load C:\tools\sos\sos.dll",
                "!clrstack",
                "!dumpheap -stat",
                ".detach",
                "qq"
            ]
        );
        assert_eq!(script.platform(), Platform::Windows);
    }

    #[test]
    fn test_unix_script() {
        let script = DebugScript::build(Platform::Unix, Path::new(EXT), &["clrstack", "clrthreads"]);
        assert_eq!(script.lines(), ["clrstack", "clrthreads", "exit"]);
    }

    #[test]
    fn test_empty_commands() {
        let none: [&str; 0] = [];
        let windows = DebugScript::build(Platform::Windows, Path::new(EXT), &none);
        assert_eq!(windows.lines().len(), 4);
        assert_eq!(windows.lines()[3], "qq");

        let unix = DebugScript::build(Platform::Unix, Path::new(""), &none);
        assert_eq!(unix.lines(), ["exit"]);
    }

    #[test]
    fn test_build_is_repeatable() {
        let cmds = vec!["eeversion".to_string(), "clrmodules".to_string()];
        for platform in [Platform::Windows, Platform::Unix] {
            assert_eq!(
                DebugScript::build(platform, Path::new(EXT), &cmds),
                DebugScript::build(platform, Path::new(EXT), &cmds)
            );
        }
    }

    #[tokio::test]
    async fn test_write_one_line_per_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts").join("dump.txt");
        let script = DebugScript::build(Platform::Unix, Path::new(""), &["clrstack"]);
        script.write_to(&path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "clrstack\nexit\n");
    }
}
