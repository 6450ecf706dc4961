//! Configuration and log locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/diag-runner/`
//! - macOS: `~/Library/Application Support/diag-runner/`
//! - Windows: `%APPDATA%\diag-runner\`

use std::path::PathBuf;

const APP_NAME: &str = "diag-runner";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
            assert!(path.to_string_lossy().contains(APP_NAME));
        }
    }

    #[test]
    fn test_log_dir_is_under_app_dir() {
        if let Some(dir) = log_dir() {
            assert!(dir.ends_with("logs"));
        }
    }
}
