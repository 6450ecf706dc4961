//! Error types for the diagnostics runner
//!
//! Messages name the offending field, path or platform so that a failed
//! configuration can be fixed without reading the source.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the diagnostics runner
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Missing required field '{field}': {hint}")]
    MissingField { field: String, hint: String },

    #[error("Invalid value '{value}' for field '{field}': expected one of {expected}")]
    InvalidField {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Process Errors ===
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write to stdin of '{program}': {source}")]
    StdinWrite {
        program: String,
        #[source]
        source: io::Error,
    },

    // === Debugging Protocol Errors ===
    #[error("Debug script targets {script} but the debugger runs on {target}")]
    PlatformMismatch { script: String, target: String },

    #[error("Invalid debug target: {0}")]
    InvalidTarget(String),

    // === Pipeline Errors ===
    #[error("Pipeline step failed: {0}")]
    StepFailed(String),

    // === Artifact Errors ===
    #[error("Tool '{tool}' not found under {root}")]
    ToolNotFound { tool: String, root: String },

    #[error("Application artifact missing: {0}")]
    AppArtifactMissing(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a missing field error with a hint for the template author
    pub fn missing_field(field: &str, hint: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            hint: hint.to_string(),
        }
    }

    /// Create an invalid field error listing the accepted values
    pub fn invalid_field<S: AsRef<str>>(field: &str, value: &str, expected: &[S]) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
            expected: expected
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a spawn error for the given program
    pub fn spawn(program: &Path, source: io::Error) -> Self {
        Self::Spawn {
            program: program.display().to_string(),
            source,
        }
    }

    /// Create a platform mismatch error
    pub fn platform_mismatch(script: impl ToString, target: impl ToString) -> Self {
        Self::PlatformMismatch {
            script: script.to_string(),
            target: target.to_string(),
        }
    }

    /// Create a tool-not-found error
    pub fn tool_not_found(tool: &str, root: &Path) -> Self {
        Self::ToolNotFound {
            tool: tool.to_string(),
            root: root.display().to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &Path, error: impl ToString) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_names_field() {
        let err = Error::missing_field("test.testbed", "set the testbed directory");
        let msg = err.to_string();
        assert!(msg.contains("test.testbed"));
        assert!(msg.contains("set the testbed directory"));
    }

    #[test]
    fn test_invalid_field_lists_expected() {
        let err = Error::invalid_field("app.build_config", "Fast", &["Debug", "Release"]);
        assert_eq!(
            err.to_string(),
            "Invalid value 'Fast' for field 'app.build_config': expected one of Debug, Release"
        );
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        use std::error::Error as _;
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = Error::spawn(Path::new("/missing/tool"), io_err);
        assert!(err.to_string().contains("/missing/tool"));
        assert!(err.source().is_some());
    }
}
