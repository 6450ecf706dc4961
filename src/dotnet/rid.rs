//! Runtime identifiers and debugger platforms

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Debugger/script dialect family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// cdb-style debuggers
    Windows,
    /// lldb-style debuggers
    Unix,
}

impl Platform {
    /// Get the current platform
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn is_windows(self) -> bool {
        self == Platform::Windows
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Unix => write!(f, "unix"),
        }
    }
}

/// Runtime identifier: operating system plus architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Rid {
    WinX64,
    WinX86,
    WinArm64,
    LinuxX64,
    LinuxMuslX64,
    LinuxArm64,
    LinuxMuslArm64,
    LinuxArm,
    LinuxMuslArm,
    OsxX64,
    OsxArm64,
}

/// Architectures every Windows SDK version is tested with, in emission order
pub const WINDOWS_TEST_RIDS: [Rid; 2] = [Rid::WinX86, Rid::WinX64];

impl Rid {
    pub const ALL: [Rid; 11] = [
        Rid::WinX64,
        Rid::WinX86,
        Rid::WinArm64,
        Rid::LinuxX64,
        Rid::LinuxMuslX64,
        Rid::LinuxArm64,
        Rid::LinuxMuslArm64,
        Rid::LinuxArm,
        Rid::LinuxMuslArm,
        Rid::OsxX64,
        Rid::OsxArm64,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rid::WinX64 => "win-x64",
            Rid::WinX86 => "win-x86",
            Rid::WinArm64 => "win-arm64",
            Rid::LinuxX64 => "linux-x64",
            Rid::LinuxMuslX64 => "linux-musl-x64",
            Rid::LinuxArm64 => "linux-arm64",
            Rid::LinuxMuslArm64 => "linux-musl-arm64",
            Rid::LinuxArm => "linux-arm",
            Rid::LinuxMuslArm => "linux-musl-arm",
            Rid::OsxX64 => "osx-x64",
            Rid::OsxArm64 => "osx-arm64",
        }
    }

    /// RID of the machine the runner is executing on
    pub fn current() -> Self {
        let musl = cfg!(target_env = "musl");
        if cfg!(windows) {
            if cfg!(target_arch = "x86") {
                Rid::WinX86
            } else if cfg!(target_arch = "aarch64") {
                Rid::WinArm64
            } else {
                Rid::WinX64
            }
        } else if cfg!(target_os = "macos") {
            if cfg!(target_arch = "aarch64") {
                Rid::OsxArm64
            } else {
                Rid::OsxX64
            }
        } else if cfg!(target_arch = "aarch64") {
            if musl {
                Rid::LinuxMuslArm64
            } else {
                Rid::LinuxArm64
            }
        } else if cfg!(target_arch = "arm") {
            if musl {
                Rid::LinuxMuslArm
            } else {
                Rid::LinuxArm
            }
        } else if musl {
            Rid::LinuxMuslX64
        } else {
            Rid::LinuxX64
        }
    }

    pub fn platform(self) -> Platform {
        if self.as_str().starts_with("win") {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn executable_extension(self) -> &'static str {
        if self.platform().is_windows() {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rid::ALL
            .iter()
            .copied()
            .find(|rid| rid.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Rid::ALL.iter().map(|r| r.as_str()).collect();
                Error::invalid_field("rid", s, &valid)
            })
    }
}

impl TryFrom<String> for Rid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Rid> for String {
    fn from(rid: Rid) -> Self {
        rid.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_every_rid() {
        for rid in Rid::ALL {
            assert_eq!(rid.as_str().parse::<Rid>().unwrap(), rid);
        }
    }

    #[test]
    fn test_unknown_rid_rejected() {
        let err = "freebsd-x64".parse::<Rid>().unwrap_err();
        assert!(err.to_string().contains("freebsd-x64"));
        assert!(err.to_string().contains("linux-x64"));
    }

    #[test]
    fn test_platform_and_extensions() {
        assert_eq!(Rid::WinArm64.platform(), Platform::Windows);
        assert_eq!(Rid::LinuxMuslArm.platform(), Platform::Unix);
        assert_eq!(Rid::OsxArm64.platform(), Platform::Unix);
        assert_eq!(Rid::WinX86.executable_extension(), ".exe");
        assert_eq!(Rid::LinuxX64.executable_extension(), "");
    }

    #[test]
    fn test_current_matches_host_platform() {
        assert_eq!(Rid::current().platform(), Platform::current());
    }

    #[test]
    fn test_windows_pair_order() {
        assert_eq!(WINDOWS_TEST_RIDS, [Rid::WinX86, Rid::WinX64]);
    }
}
