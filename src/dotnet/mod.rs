//! Managed-runtime specifics: RIDs, sample apps and diagnostic tools

mod app;
mod rid;
mod tool;

pub use app::{BuildConfig, TargetApp};
pub use rid::{Platform, Rid, WINDOWS_TEST_RIDS};
pub use tool::{install_spec, tool_entry_point, DiagTool};

/// Target framework moniker for an SDK version (`8.0.100` -> `net8.0`)
pub fn target_framework(sdk_version: &str) -> String {
    let mut parts = sdk_version.split('.');
    let major = parts.next().unwrap_or(sdk_version);
    let minor = parts.next().unwrap_or("0");
    format!("net{}.{}", major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_framework() {
        assert_eq!(target_framework("8.0"), "net8.0");
        assert_eq!(target_framework("9.0.100-preview.1"), "net9.0");
        assert_eq!(target_framework("10"), "net10.0");
    }
}
