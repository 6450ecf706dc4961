//! CLI command definitions
//!
//! Defines the clap commands for the diagnostics runner CLI.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Expand a test template and print its run configurations
    Plan {
        /// Path to the YAML test template
        template: PathBuf,

        /// Print the configurations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the dump-analysis campaign for every configuration of a template
    Run {
        /// Path to the YAML test template
        template: PathBuf,

        /// Reuse installed tools and built apps from an earlier run
        #[arg(long)]
        skip_init: bool,

        /// Directory for runner.log [default: the data directory]
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Run one scripted session in the native debugger
    Debug {
        /// What to debug
        #[arg(value_enum)]
        mode: DebugMode,

        /// Dump path, process id, or executable, depending on the mode
        target: String,

        /// Debugger executable (default: from settings, then PATH)
        #[arg(long)]
        debugger: Option<PathBuf>,

        /// RID whose debugger dialect to use (default: host RID)
        #[arg(long)]
        rid: Option<String>,

        /// Where to write the generated debugger script
        #[arg(long)]
        script_out: PathBuf,

        /// Managed debugging extension loaded by Windows debuggers
        #[arg(long)]
        extension: Option<PathBuf>,

        /// Analysis command; may be given multiple times
        #[arg(long = "cmd", short = 'c')]
        commands: Vec<String>,

        /// Append the session to this log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Echo debugger output while it runs
        #[arg(long, short)]
        verbose: bool,
    },

    /// Open a dump in the managed dump analyzer and run commands in it
    Analyze {
        /// Dump file to open
        dump: PathBuf,

        /// Runtime host executable
        #[arg(long)]
        dotnet: PathBuf,

        /// Analyzer entry point (dotnet-dump.dll)
        #[arg(long)]
        tool: PathBuf,

        /// Analysis command; defaults to the base command set
        #[arg(long = "cmd", short = 'c')]
        commands: Vec<String>,

        /// Append the session to this log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Echo analyzer output while it runs
        #[arg(long, short)]
        verbose: bool,
    },

    /// Run a monitor-style tool for a fixed time, then stop it
    Monitor {
        /// Seconds to let the tool run (default: from settings)
        #[arg(long)]
        seconds: Option<u64>,

        /// Append the captured output to this log file
        #[arg(long)]
        log: Option<PathBuf>,

        /// Tool executable
        program: PathBuf,

        /// Arguments to pass to the tool
        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// Debugging mode for the `debug` command
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DebugMode {
    /// Open a crash dump
    Dump,
    /// Attach to a running process by id
    Attach,
    /// Start an executable under the debugger
    Launch,
}
