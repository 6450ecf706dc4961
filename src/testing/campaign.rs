//! Dump-analysis campaign
//!
//! Runs every configuration in turn: install the tool and build the sample
//! apps, crash each app with dump generation enabled, then inspect the dumps.
//! `CrossOSDAC` runs open every dump in the managed analyzer. `DebuggerExtension`
//! runs open the dump in the native debugger and also launch the app under it.
//! A configuration that fails is reported in its summary and the campaign
//! moves on to the next one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use colored::Colorize;
use futures_util::{stream, Stream, StreamExt};

use super::expander::RunConfiguration;
use super::template::TestKind;
use crate::common::config::Settings;
use crate::common::{Error, Result};
use crate::debugging::{base_commands, CliDebugger, DebugScript, DebugSession, DumpAnalyzer};
use crate::dotnet::{install_spec, tool_entry_point, Platform, Rid, TargetApp};
use crate::pipeline::{log, PipelineOutcome, PipelineReport, PipelineRunner};
use crate::process::{CommandSpec, FailureCause, InvocationResult, InvokeOptions, Launcher, ProcessInvoker};

/// SOS commands run by the native debugger against dumps and launched apps
pub const SOS_DEBUG_COMMANDS: [&str; 6] = [
    "clrthreads",
    "verifyheap",
    "dumpheap -stat",
    "dumpasync",
    "dumplog",
    "crashinfo",
];

const DEBUG_DUMP_LOG: &str = "debug-dump.log";
const DEBUG_PROCESS_LOG: &str = "debug-process.log";
const DUMP_DEBUG_SCRIPT: &str = "dump-debug-script.txt";
const PROCESS_DEBUG_SCRIPT: &str = "process-debug-script.txt";

/// Campaign switches
#[derive(Debug, Clone, Default)]
pub struct CampaignOptions {
    /// Echo child output live
    pub echo: bool,
    /// Reuse installed tools and built apps from an earlier run
    pub skip_init: bool,
    /// Native debugger for `DebuggerExtension` runs
    pub debugger: Option<PathBuf>,
    /// Managed debugging extension loaded by Windows debuggers
    pub extension: Option<PathBuf>,
}

/// Outcome of one configuration
#[derive(Debug)]
pub struct ConfigurationSummary {
    pub test_name: String,
    /// Install/build pipeline; `None` when skipped
    pub init: Option<PipelineReport>,
    /// Dump-generation pipeline; `None` when not reached
    pub dumps: Option<PipelineReport>,
    /// Launch-under-debugger pipeline of `DebuggerExtension` runs
    pub launches: Option<PipelineReport>,
    /// Analysis logs written
    pub analyzed: Vec<PathBuf>,
    /// Analysis sessions that reported errors
    pub analysis_failures: usize,
    /// Dumps that were expected but not produced
    pub missing_dumps: Vec<PathBuf>,
    /// Why the configuration stopped early
    pub error: Option<String>,
}

impl ConfigurationSummary {
    fn new(test_name: &str) -> Self {
        Self {
            test_name: test_name.to_string(),
            init: None,
            dumps: None,
            launches: None,
            analyzed: Vec::new(),
            analysis_failures: 0,
            missing_dumps: Vec::new(),
            error: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none()
            && self.init.as_ref().map_or(true, PipelineReport::succeeded)
            && self.launches.as_ref().map_or(true, PipelineReport::succeeded)
            && self.missing_dumps.is_empty()
            && self.analysis_failures == 0
    }
}

enum InitStep<'a> {
    InstallTool,
    InstallExtension,
    CreateApp(&'a TargetApp),
    BuildApp(&'a TargetApp),
}

enum ExtensionStep<'a> {
    CrashApp(&'a TargetApp),
    DebugDump(&'a TargetApp),
}

/// Native debugger and script shared by every session of one run
struct NativeDebugging<'a, L> {
    debugger: CliDebugger<&'a L>,
    script: DebugScript,
    failures: AtomicUsize,
}

impl<L: Launcher> NativeDebugging<'_, L> {
    fn record(&self, result: &InvocationResult) {
        if result.is_failure() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Drives the dump-analysis flow over a list of run configurations
pub struct DumpCampaign<L = ProcessInvoker> {
    launcher: L,
    options: CampaignOptions,
}

impl DumpCampaign<ProcessInvoker> {
    pub fn new(settings: &Settings, skip_init: bool) -> Self {
        let launcher = ProcessInvoker::new().with_teardown_grace(settings.timeouts.teardown_grace());
        Self::with_launcher(
            launcher,
            CampaignOptions {
                echo: settings.output.echo,
                skip_init,
                debugger: settings.debugger_path(),
                extension: settings.debuggers.extension.clone(),
            },
        )
    }
}

impl<L: Launcher> DumpCampaign<L> {
    pub fn with_launcher(launcher: L, options: CampaignOptions) -> Self {
        Self { launcher, options }
    }

    /// Run every configuration, in order, one at a time
    pub async fn run(&self, configs: &[RunConfiguration]) -> Vec<ConfigurationSummary> {
        let mut summaries = Vec::with_capacity(configs.len());
        for config in configs {
            let summary = self.run_configuration(config).await;
            if summary.passed() {
                println!("{} {}", "✓".green().bold(), summary.test_name.green());
            } else {
                println!(
                    "{} {} {}",
                    "✗".red().bold(),
                    summary.test_name.red(),
                    summary.error.as_deref().unwrap_or("").dimmed()
                );
            }
            summaries.push(summary);
        }
        summaries
    }

    /// Run one configuration; never returns an error
    pub async fn run_configuration(&self, config: &RunConfiguration) -> ConfigurationSummary {
        println!("\n{} {}", "Running Test:".blue().bold(), config.test_name.white().bold());
        let mut summary = ConfigurationSummary::new(&config.test_name);
        let init_log = config.init_log_path();

        if let Err(e) = prepare_folders(config).await {
            self.abort(&mut summary, &init_log, e).await;
            return summary;
        }

        if !self.options.skip_init {
            println!("\n{}", "Setup:".cyan());
            let report = PipelineRunner::new(&init_log).run(self.init_steps(config)).await;
            let ok = report.succeeded();
            summary.init = Some(report);
            if !ok {
                summary.error = Some(format!("initialization failed, see {}", init_log.display()));
                return summary;
            }
        }

        match config.kind {
            TestKind::CrossOsDac => self.analyze_dumps(config, &mut summary).await,
            TestKind::DebuggerExtension => self.debug_with_extension(config, &mut summary).await,
        }
        summary
    }

    /// Crash every app, then open each dump in the managed analyzer
    async fn analyze_dumps(&self, config: &RunConfiguration, summary: &mut ConfigurationSummary) {
        let init_log = config.init_log_path();
        println!("\n{}", "Generating dumps:".cyan());
        // The apps are meant to crash, so their failures are expected
        let report = PipelineRunner::new(&init_log)
            .ignore_errors(true)
            .run(self.dump_steps(config))
            .await;
        let stopped = matches!(report.outcome, PipelineOutcome::ProductionFailed { .. });
        summary.dumps = Some(report);
        if stopped {
            summary.error = Some(format!("dump generation stopped, see {}", init_log.display()));
            return;
        }

        println!("\n{}", "Analyzing dumps:".cyan());
        let analyzer = match DumpAnalyzer::installed(&config.env, &config.tool_root, &config.tool.version) {
            Ok(analyzer) => analyzer.with_launcher(&self.launcher),
            Err(e) => {
                self.abort(summary, &init_log, e).await;
                return;
            }
        };

        let commands = base_commands();
        for app in &config.apps {
            let dump = dump_path(config, app);
            if !dump.exists() {
                tracing::warn!("{}: no dump at {}", config.test_name, dump.display());
                summary.missing_dumps.push(dump);
                continue;
            }

            let result = analyzer
                .analyze(&config.env, Path::new(""), &dump, &commands, self.options.echo)
                .await;
            if result.is_failure() {
                summary.analysis_failures += 1;
            }

            let log_path = analysis_log_path(config, &dump);
            match PipelineRunner::record_single(&log_path, &result).await {
                Ok(()) => summary.analyzed.push(log_path),
                Err(e) => tracing::warn!("Failed to record analysis of {}: {}", dump.display(), e),
            }
        }
    }

    /// Crash every app and open its dump in the native debugger, then launch
    /// every app under the debugger
    async fn debug_with_extension(&self, config: &RunConfiguration, summary: &mut ConfigurationSummary) {
        let init_log = config.init_log_path();
        let native = match self.native_debugging(config) {
            Ok(native) => native,
            Err(e) => {
                self.abort(summary, &init_log, e).await;
                return;
            }
        };

        println!("\n{}", "Debugging dumps:".cyan());
        let dump_log = config.analysis_folder.join(DEBUG_DUMP_LOG);
        // The apps are meant to crash, so their failures are expected
        let report = PipelineRunner::new(&dump_log)
            .ignore_errors(true)
            .run(self.extension_steps(config, &native))
            .await;
        let stopped = matches!(report.outcome, PipelineOutcome::ProductionFailed { .. });
        summary.dumps = Some(report);
        summary.analyzed.push(dump_log.clone());
        summary.missing_dumps.extend(
            config
                .apps
                .iter()
                .map(|app| dump_path(config, app))
                .filter(|dump| !dump.exists()),
        );
        if stopped {
            summary.analysis_failures = native.failures.load(Ordering::Relaxed);
            summary.error = Some(format!("dump debugging stopped, see {}", dump_log.display()));
            return;
        }

        println!("\n{}", "Debugging processes:".cyan());
        let process_log = config.analysis_folder.join(DEBUG_PROCESS_LOG);
        let native = &native;
        let steps = stream::iter(config.apps.iter()).then(move |app| self.debug_launch(config, native, app));
        let report = PipelineRunner::new(&process_log).run(steps).await;
        summary.launches = Some(report);
        summary.analyzed.push(process_log);
        summary.analysis_failures = native.failures.load(Ordering::Relaxed);
    }

    async fn abort(&self, summary: &mut ConfigurationSummary, log_path: &Path, err: Error) {
        tracing::warn!("{}: {}", summary.test_name, err);
        let cause = FailureCause::from_error(&err);
        if let Err(e) = log::append(log_path, &log::format_production_failure(&cause)).await {
            tracing::warn!("Failed to append to {}: {}", log_path.display(), e);
        }
        summary.error = Some(err.to_string());
    }

    fn opts(&self) -> InvokeOptions {
        InvokeOptions::captured().with_echo(self.options.echo)
    }

    fn init_steps<'a>(
        &'a self,
        config: &'a RunConfiguration,
    ) -> impl Stream<Item = Result<InvocationResult>> + 'a {
        let mut steps = vec![InitStep::InstallTool];
        if config.kind == TestKind::DebuggerExtension {
            steps.push(InitStep::InstallExtension);
        }
        steps.extend(config.apps.iter().map(InitStep::CreateApp));
        steps.extend(config.apps.iter().map(InitStep::BuildApp));
        stream::iter(steps).then(move |step| self.init_step(config, step))
    }

    async fn init_step(&self, config: &RunConfiguration, step: InitStep<'_>) -> Result<InvocationResult> {
        let spec = match step {
            InitStep::InstallTool => install_spec(
                &config.env,
                &config.tool_root,
                &config.tool.feed,
                &config.tool.version,
                config.kind.tool().package_name(),
                config.tool.nuget_config.as_deref(),
            )?,
            // Resolved only now, after the tool install step has run
            InitStep::InstallExtension => {
                let entry = tool_entry_point(
                    &config.tool_root,
                    config.kind.tool().package_name(),
                    &config.tool.version,
                )?;
                let runtime = config.env.runtime_executable(Rid::current())?;
                CommandSpec::new(runtime, config.env.clone()).args([
                    entry.to_string_lossy().into_owned(),
                    "install".to_string(),
                    "--accept-license-agreement".to_string(),
                ])
            }
            InitStep::CreateApp(app) => app.create_spec()?,
            InitStep::BuildApp(app) => {
                if let Some(source) = config.app_sources.get(&app.name) {
                    let target = app.root.join("Program.cs");
                    tokio::fs::copy(source, &target)
                        .await
                        .map_err(|e| Error::file_read(source, e))?;
                }
                if config.kind.publishes_apps() {
                    app.publish_spec(config.build_config, config.target_rid())?
                } else {
                    app.build_spec(config.build_config, config.target_rid())?
                }
            }
        };
        Ok(self.launcher.invoke(&spec, self.opts()).await)
    }

    fn dump_steps<'a>(
        &'a self,
        config: &'a RunConfiguration,
    ) -> impl Stream<Item = Result<InvocationResult>> + 'a {
        stream::iter(config.apps.iter()).then(move |app| self.run_app(config, app))
    }

    /// Debugger, extension and SOS script for the run's target platform
    fn native_debugging(&self, config: &RunConfiguration) -> Result<NativeDebugging<'_, L>> {
        let path = self.options.debugger.clone().ok_or_else(|| {
            Error::missing_field(
                "debuggers.path",
                "DebuggerExtension runs need a native debugger; set it in the settings",
            )
        })?;
        let platform = config.target_rid().platform();
        let extension = match (platform, &self.options.extension) {
            (_, Some(ext)) => ext.clone(),
            (Platform::Windows, None) => {
                return Err(Error::missing_field(
                    "debuggers.extension",
                    "Windows debuggers need the managed debugging extension to load",
                ))
            }
            (Platform::Unix, None) => PathBuf::new(),
        };
        Ok(NativeDebugging {
            debugger: CliDebugger::new(path, platform).with_launcher(&self.launcher),
            script: DebugScript::build(platform, &extension, &SOS_DEBUG_COMMANDS),
            failures: AtomicUsize::new(0),
        })
    }

    fn extension_steps<'a>(
        &'a self,
        config: &'a RunConfiguration,
        native: &'a NativeDebugging<'a, L>,
    ) -> impl Stream<Item = Result<InvocationResult>> + 'a {
        let steps = config
            .apps
            .iter()
            .flat_map(|app| [ExtensionStep::CrashApp(app), ExtensionStep::DebugDump(app)]);
        stream::iter(steps).then(move |step| self.extension_step(config, native, step))
    }

    async fn extension_step(
        &self,
        config: &RunConfiguration,
        native: &NativeDebugging<'_, L>,
        step: ExtensionStep<'_>,
    ) -> Result<InvocationResult> {
        match step {
            ExtensionStep::CrashApp(app) => self.run_app(config, app).await,
            ExtensionStep::DebugDump(app) => {
                let session = DebugSession::new(
                    config.env.clone(),
                    config.analysis_folder.join(DUMP_DEBUG_SCRIPT),
                )
                .working_dir(&app.root)
                .echo(self.options.echo);
                let result = native
                    .debugger
                    .debug_dump(&dump_path(config, app), &native.script, &session)
                    .await?;
                native.record(&result);
                Ok(result)
            }
        }
    }

    /// Start an app under the debugger with the stress log enabled
    async fn debug_launch(
        &self,
        config: &RunConfiguration,
        native: &NativeDebugging<'_, L>,
        app: &TargetApp,
    ) -> Result<InvocationResult> {
        let exe = app.executable(
            config.build_config,
            &config.framework(),
            config.target_rid(),
            config.kind.publishes_apps(),
        )?;
        let mut env = app.env.clone();
        env.enable_stress_log();
        let session = DebugSession::new(env, config.analysis_folder.join(PROCESS_DEBUG_SCRIPT))
            .working_dir(&app.root)
            .echo(self.options.echo);
        let result = native
            .debugger
            .debug_launch(&exe, &native.script, &session)
            .await?;
        native.record(&result);
        Ok(result)
    }

    /// Run an app with dump generation into its own copy of the environment
    async fn run_app(&self, config: &RunConfiguration, app: &TargetApp) -> Result<InvocationResult> {
        let exe = app.executable(
            config.build_config,
            &config.framework(),
            config.target_rid(),
            config.kind.publishes_apps(),
        )?;
        let dump = dump_path(config, app);
        remove_stale(&dump).await?;

        let mut env = app.env.clone();
        env.enable_dump_generation(&dump);
        if config.kind.uses_stress_log() {
            env.enable_stress_log();
        }
        let spec = CommandSpec::new(exe, env).working_dir(&app.root);
        Ok(self.launcher.invoke(&spec, self.opts()).await)
    }
}

async fn prepare_folders(config: &RunConfiguration) -> Result<()> {
    for dir in [&config.result_root, &config.dump_folder, &config.analysis_folder] {
        tokio::fs::create_dir_all(dir).await?;
    }
    let script_path = config.activation_script_path();
    let script = config
        .env
        .activation_script(config.target_rid(), Some(&config.tool_root))?;
    tokio::fs::write(&script_path, script).await?;
    tracing::debug!("Wrote activation script {}", script_path.display());
    Ok(())
}

/// `<dumps>/<app>-<rid>.dmp`
pub fn dump_path(config: &RunConfiguration, app: &TargetApp) -> PathBuf {
    config
        .dump_folder
        .join(format!("{}-{}.dmp", app.name, config.target_rid().as_str()))
}

/// `<analysis>/<dump name>.log`
pub fn analysis_log_path(config: &RunConfiguration, dump: &Path) -> PathBuf {
    let stem = dump
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dump".to_string());
    config.analysis_folder.join(format!("{}.log", stem))
}

async fn remove_stale(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
