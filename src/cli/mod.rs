//! CLI command handling
//!
//! Dispatches CLI commands to the runner components and formats output.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, DebugMode};
use crate::common::config::Settings;
use crate::common::{Error, Result};
use crate::debugging::{base_commands, CliDebugger, DebugScript, DebugSession, DebugTarget, DumpAnalyzer};
use crate::dotnet::{DiagTool, Platform, Rid};
use crate::pipeline::PipelineRunner;
use crate::process::{CommandSpec, EnvironmentSnapshot, InvocationResult, InvokeOptions, ProcessInvoker};
use crate::testing::{expand_for_current_host, DumpCampaign, RunConfiguration, TestTemplate};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, settings: &Settings) -> Result<()> {
    match command {
        Commands::Plan { template, json } => {
            let configs = load_configurations(&template)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&configs)?);
            } else {
                for config in &configs {
                    print_configuration(config);
                }
            }
            Ok(())
        }

        Commands::Run {
            template,
            skip_init,
            log_dir: _,
        } => {
            let configs = load_configurations(&template)?;
            let campaign = DumpCampaign::new(settings, skip_init);
            let summaries = campaign.run(&configs).await;

            let failed: Vec<&str> = summaries
                .iter()
                .filter(|s| !s.passed())
                .map(|s| s.test_name.as_str())
                .collect();

            println!(
                "\n{} passed, {} failed",
                (summaries.len() - failed.len()).to_string().green(),
                failed.len().to_string().red()
            );

            if failed.is_empty() {
                Ok(())
            } else {
                Err(Error::StepFailed(format!(
                    "configurations failed: {}",
                    failed.join(", ")
                )))
            }
        }

        Commands::Debug {
            mode,
            target,
            debugger,
            rid,
            script_out,
            extension,
            commands,
            log,
            verbose,
        } => {
            let platform = match rid {
                Some(rid) => Rid::from_str(&rid)?.platform(),
                None => Platform::current(),
            };
            let extension = match (platform, extension.or_else(|| settings.debuggers.extension.clone())) {
                (_, Some(ext)) => ext,
                (Platform::Windows, None) => {
                    return Err(Error::missing_field(
                        "--extension",
                        "Windows debuggers need the managed debugging extension to load",
                    ))
                }
                (Platform::Unix, None) => PathBuf::new(),
            };
            let debugger = match debugger {
                Some(path) => CliDebugger::new(path, platform),
                None => CliDebugger::from_settings(settings, platform)?,
            };

            let commands = if commands.is_empty() {
                base_commands()
            } else {
                commands
            };
            let script = DebugScript::build(platform, &extension, &commands);
            let session = DebugSession::new(EnvironmentSnapshot::from_process(), script_out)
                .echo(verbose || settings.output.echo);

            let target = parse_target(mode, &target)?;
            let result = debugger.debug(&target, &script, &session).await?;
            finish(&result, log.as_deref()).await
        }

        Commands::Analyze {
            dump,
            dotnet,
            tool,
            commands,
            log,
            verbose,
        } => {
            let commands = if commands.is_empty() {
                base_commands()
            } else {
                commands
            };
            let result = DumpAnalyzer::new(dotnet, tool)
                .analyze(
                    &EnvironmentSnapshot::from_process(),
                    Path::new(""),
                    &dump,
                    &commands,
                    verbose || settings.output.echo,
                )
                .await;
            finish(&result, log.as_deref()).await
        }

        Commands::Monitor {
            seconds,
            log,
            program,
            args,
        } => {
            let duration = seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.timeouts.monitor());
            warn_if_not_monitoring(&program);
            let spec = CommandSpec::new(program, EnvironmentSnapshot::from_process()).args(args);
            let result = ProcessInvoker::new()
                .with_teardown_grace(settings.timeouts.teardown_grace())
                .invoke_with_timeout(&spec, InvokeOptions::captured().with_echo(true), duration)
                .await;
            finish(&result, log.as_deref()).await
        }
    }
}

/// Known tools that never run until stopped will just exit early
fn warn_if_not_monitoring(program: &Path) {
    let tool = program
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<DiagTool>().ok());
    if let Some(tool) = tool {
        if !tool.has_monitor_mode() {
            tracing::warn!("{} has no monitor mode; it will likely exit on its own", tool);
        }
    }
}

fn load_configurations(template: &Path) -> Result<Vec<RunConfiguration>> {
    let template = TestTemplate::load(template)?;
    expand_for_current_host(&template)
}

fn parse_target(mode: DebugMode, target: &str) -> Result<DebugTarget> {
    match mode {
        DebugMode::Dump => Ok(DebugTarget::Dump(PathBuf::from(target))),
        DebugMode::Launch => Ok(DebugTarget::Launch(PathBuf::from(target))),
        DebugMode::Attach => target
            .parse::<u32>()
            .map(DebugTarget::Process)
            .map_err(|e| Error::InvalidTarget(format!("'{}' is not a process id: {}", target, e))),
    }
}

/// Report a single result and optionally log it
///
/// A process that could not be started is an error; anything it printed to
/// stderr is only reported.
async fn finish(result: &InvocationResult, log: Option<&Path>) -> Result<()> {
    if let Some(log) = log {
        PipelineRunner::record_single(log, result).await?;
    }

    if let Some(cause) = &result.failure {
        println!("  {} {}", "✗".red(), result.command.dimmed());
        return Err(Error::StepFailed(cause.to_string()));
    }

    if result.is_failure() {
        println!("  {} {}", "✗".red(), result.command.dimmed());
        eprint!("{}", result.stderr);
    } else {
        println!("  {} {}", "✓".green(), result.command.dimmed());
    }
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    Ok(())
}

fn print_configuration(config: &RunConfiguration) {
    println!("{}", config.test_name.white().bold());
    println!("  SDK:       {}", config.sdk_root.display());
    println!("  Tool:      {}", config.tool_root.display());
    println!("  Dumps:     {}", config.dump_folder.display());
    println!("  Analysis:  {}", config.analysis_folder.display());
    println!("  Build:     {} ({})", config.build_folder.display(), config.build_config);
    let apps: Vec<&str> = config.apps.iter().map(|a| a.name.as_str()).collect();
    println!("  Apps:      {}", apps.join(", ").dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target(DebugMode::Attach, "1234").unwrap(),
            DebugTarget::Process(1234)
        );
        assert_eq!(
            parse_target(DebugMode::Dump, "/d/core.1").unwrap(),
            DebugTarget::Dump(PathBuf::from("/d/core.1"))
        );
        assert!(matches!(
            parse_target(DebugMode::Attach, "app").unwrap_err(),
            Error::InvalidTarget(_)
        ));
    }
}
