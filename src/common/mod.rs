//! Common utilities shared by the runner components

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Render a program and its arguments as one display line.
///
/// Used for log headers and console progress lines only; the child is always
/// spawned with the discrete argument list.
pub fn render_command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg.as_ref());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_command_line() {
        assert_eq!(render_command_line("lldb", &["-s", "a.txt"]), "lldb -s a.txt");
        assert_eq!(render_command_line::<&str>("app", &[]), "app");
    }
}
