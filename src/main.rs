//! Diagnostics validation runner
//!
//! Builds sample apps, crashes them into dumps, and drives debuggers and
//! dump analyzers against the results, logging every command it runs.

use clap::Parser;
use commands::Commands;
use diagrunner::common::config::Settings;
use diagrunner::common::logging;
use diagrunner::{cli, commands};

#[derive(Parser)]
#[command(name = "diagrunner", about = "Diagnostic tooling validation runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Held until exit so the file writer flushes
    let _guard = match &cli.command {
        Commands::Run { log_dir, .. } => logging::init_with_file(log_dir.as_deref()),
        _ => {
            logging::init_cli();
            None
        }
    };

    let result = match Settings::load() {
        Ok(settings) => cli::dispatch(cli.command, &settings).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
