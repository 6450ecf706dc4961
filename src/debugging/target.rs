//! What a debugger session attaches to, and the matching argument line

use std::fmt;
use std::path::{Path, PathBuf};

use crate::dotnet::Platform;

/// Target of one debugger session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugTarget {
    /// Crash dump file
    Dump(PathBuf),
    /// Live process id
    Process(u32),
    /// Executable started under the debugger
    Launch(PathBuf),
}

impl fmt::Display for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugTarget::Dump(path) => write!(f, "dump {}", path.display()),
            DebugTarget::Process(pid) => write!(f, "process {}", pid),
            DebugTarget::Launch(path) => write!(f, "launch {}", path.display()),
        }
    }
}

/// Debugger arguments for `target` with the script at `script`
///
/// | target  | windows                      | unix                               |
/// |---------|------------------------------|------------------------------------|
/// | dump    | `-cf <script> -z <dump>`     | `-c <dump> -s <script> --batch`    |
/// | attach  | `-cf <script> -p <pid>`      | `-s <script> -p <pid> --batch`     |
/// | launch  | `-g -cf <script> <exe>`      | `-s <script> --batch <exe>`        |
pub fn render_arguments(platform: Platform, target: &DebugTarget, script: &Path) -> Vec<String> {
    let script = path_arg(script);
    match (platform, target) {
        (Platform::Windows, DebugTarget::Dump(dump)) => {
            vec!["-cf".into(), script, "-z".into(), path_arg(dump)]
        }
        (Platform::Unix, DebugTarget::Dump(dump)) => vec![
            "-c".into(),
            path_arg(dump),
            "-s".into(),
            script,
            "--batch".into(),
        ],
        (Platform::Windows, DebugTarget::Process(pid)) => {
            vec!["-cf".into(), script, "-p".into(), pid.to_string()]
        }
        (Platform::Unix, DebugTarget::Process(pid)) => vec![
            "-s".into(),
            script,
            "-p".into(),
            pid.to_string(),
            "--batch".into(),
        ],
        (Platform::Windows, DebugTarget::Launch(exe)) => {
            vec!["-g".into(), "-cf".into(), script, path_arg(exe)]
        }
        (Platform::Unix, DebugTarget::Launch(exe)) => {
            vec!["-s".into(), script, "--batch".into(), path_arg(exe)]
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(platform: Platform, target: &DebugTarget) -> String {
        render_arguments(platform, target, Path::new("S.txt")).join(" ")
    }

    #[test]
    fn test_dump_arguments() {
        let dump = DebugTarget::Dump(PathBuf::from(r"D:\d.dmp"));
        assert_eq!(joined(Platform::Windows, &dump), r"-cf S.txt -z D:\d.dmp");
        assert_eq!(joined(Platform::Unix, &dump), r"-c D:\d.dmp -s S.txt --batch");
    }

    #[test]
    fn test_attach_arguments() {
        let pid = DebugTarget::Process(4242);
        assert_eq!(joined(Platform::Windows, &pid), "-cf S.txt -p 4242");
        assert_eq!(joined(Platform::Unix, &pid), "-s S.txt -p 4242 --batch");
    }

    #[test]
    fn test_launch_arguments() {
        let exe = DebugTarget::Launch(PathBuf::from("/apps/uhe/uhe"));
        assert_eq!(joined(Platform::Windows, &exe), "-g -cf S.txt /apps/uhe/uhe");
        assert_eq!(joined(Platform::Unix, &exe), "-s S.txt --batch /apps/uhe/uhe");
    }

    #[test]
    fn test_paths_with_spaces_stay_one_argument() {
        let dump = DebugTarget::Dump(PathBuf::from("/tmp/my dumps/a.dmp"));
        let args = render_arguments(Platform::Unix, &dump, Path::new("/tmp/s.txt"));
        assert_eq!(args[1], "/tmp/my dumps/a.dmp");
        assert_eq!(args.len(), 5);
    }
}
