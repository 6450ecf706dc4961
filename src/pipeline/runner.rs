//! Multi-step command pipelines
//!
//! A pipeline is a lazy stream of invocation results. The runner pulls one
//! step at a time, logs it, and decides whether to pull the next one, so a
//! later step may depend on values only known after an earlier step ran.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use colored::Colorize;
use futures_util::{FutureExt, Stream, StreamExt};

use super::log;
use crate::common::{Error, Result};
use crate::process::{FailureCause, InvocationResult};

/// How a pipeline ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every step was pulled and logged
    Completed,
    /// A step failed and errors were not ignored
    StoppedOnFailure { step: usize, command: String },
    /// Producing a step raised an error or panicked
    ProductionFailed { step: usize, message: String },
}

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Number of invocation blocks written to the log
    pub steps_logged: usize,
    /// Steps that failed (including ones that were ignored)
    pub failures: usize,
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == PipelineOutcome::Completed && self.failures == 0
    }
}

/// Runs a pipeline and persists each step to one log file
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    log_path: PathBuf,
    ignore_errors: bool,
}

impl PipelineRunner {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ignore_errors: false,
        }
    }

    /// Keep pulling steps after a failed one
    ///
    /// Meant for steps that are expected to crash, such as driving a target
    /// app into an unhandled exception to get a dump.
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Pull, log and judge steps until the stream ends or a failure stops it
    ///
    /// Never returns an error: a failure while producing a step is logged and
    /// ends the pipeline, including panics raised by the producer.
    pub async fn run<S>(&self, steps: S) -> PipelineReport
    where
        S: Stream<Item = Result<InvocationResult>>,
    {
        let mut steps = std::pin::pin!(steps);
        let mut report = PipelineReport {
            steps_logged: 0,
            failures: 0,
            outcome: PipelineOutcome::Completed,
        };
        let mut step = 0;

        loop {
            step += 1;
            let next = AssertUnwindSafe(steps.next()).catch_unwind().await;

            let result = match next {
                Ok(None) => break,
                Ok(Some(Ok(result))) => result,
                Ok(Some(Err(err))) => {
                    let cause = FailureCause::from_error(&err);
                    self.production_failed(&mut report, step, cause).await;
                    break;
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    let err = Error::StepFailed(format!("step producer panicked: {}", message));
                    let cause = FailureCause::from_error(&err);
                    self.production_failed(&mut report, step, cause).await;
                    break;
                }
            };

            self.append(&log::format_entry(&result)).await;
            report.steps_logged += 1;

            if result.is_failure() {
                report.failures += 1;
                println!("  {} {}", "✗".red(), result.command.dimmed());
                if !self.ignore_errors {
                    report.outcome = PipelineOutcome::StoppedOnFailure {
                        step,
                        command: result.command,
                    };
                    break;
                }
            } else {
                println!("  {} {}", "✓".green(), result.command.dimmed());
            }
        }

        tracing::debug!(
            "Pipeline {} finished: {:?}",
            self.log_path.display(),
            report
        );
        report
    }

    /// Log a single result produced outside any pipeline
    pub async fn record_single(log_path: &Path, result: &InvocationResult) -> Result<()> {
        log::append(log_path, &log::format_entry(result)).await
    }

    async fn production_failed(&self, report: &mut PipelineReport, step: usize, cause: FailureCause) {
        tracing::warn!(
            "Step {} of {} could not be produced: {}",
            step,
            self.log_path.display(),
            cause
        );
        self.append(&log::format_production_failure(&cause)).await;
        report.failures += 1;
        report.outcome = PipelineOutcome::ProductionFailed {
            step,
            message: cause.to_string(),
        };
    }

    async fn append(&self, text: &str) {
        if let Err(e) = log::append(&self.log_path, text).await {
            tracing::warn!("Failed to append to {}: {}", self.log_path.display(), e);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ok(command: &str) -> InvocationResult {
        InvocationResult {
            command: command.to_string(),
            stdout: format!("{} output\n", command),
            stderr: String::new(),
            pid: Some(100),
            exit_code: Some(0),
            failure: None,
        }
    }

    fn failing(command: &str) -> InvocationResult {
        InvocationResult {
            stderr: "Unhandled exception.\n".into(),
            ..ok(command)
        }
    }

    /// Three steps where the second fails; counts how many were produced
    fn three_steps(pulled: Arc<AtomicUsize>) -> impl Stream<Item = Result<InvocationResult>> {
        stream::iter(1..=3).then(move |i| {
            let pulled = pulled.clone();
            async move {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(if i == 2 {
                    failing(&format!("step{}", i))
                } else {
                    ok(&format!("step{}", i))
                })
            }
        })
    }

    fn entries(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .matches(log::ENTRY_HEADER)
            .count()
    }

    #[tokio::test]
    async fn test_stops_after_failed_step() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("init.log");
        let pulled = Arc::new(AtomicUsize::new(0));

        let report = PipelineRunner::new(&log_path)
            .run(three_steps(pulled.clone()))
            .await;

        assert_eq!(entries(&log_path), 2);
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(
            report.outcome,
            PipelineOutcome::StoppedOnFailure {
                step: 2,
                command: "step2".into()
            }
        );
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_ignore_errors_runs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("dumps.log");
        let pulled = Arc::new(AtomicUsize::new(0));

        let report = PipelineRunner::new(&log_path)
            .ignore_errors(true)
            .run(three_steps(pulled.clone()))
            .await;

        assert_eq!(entries(&log_path), 3);
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
        assert_eq!(report.outcome, PipelineOutcome::Completed);
        assert_eq!(report.failures, 1);
        assert_eq!(report.steps_logged, 3);
    }

    #[tokio::test]
    async fn test_production_error_is_logged_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("p.log");
        let steps = stream::iter(vec![
            Ok(ok("first")),
            Err(Error::AppArtifactMissing("/apps/oom/bin/oom".into())),
            Ok(ok("never")),
        ]);

        let report = PipelineRunner::new(&log_path)
            .ignore_errors(true)
            .run(steps)
            .await;

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(entries(&log_path), 1);
        assert!(text.contains("Error Message:Application artifact missing: /apps/oom/bin/oom"));
        assert!(!text.contains("never"));
        assert!(matches!(
            report.outcome,
            PipelineOutcome::ProductionFailed { step: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_producer_panic_does_not_escape() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("panic.log");
        let steps = stream::iter(0..2).then(|i| async move {
            if i == 1 {
                panic!("pid file unreadable");
            }
            Ok::<_, Error>(ok("before-panic"))
        });

        let report = PipelineRunner::new(&log_path).run(steps).await;

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("pid file unreadable"));
        assert!(matches!(
            report.outcome,
            PipelineOutcome::ProductionFailed { step: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_later_step_uses_earlier_result() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("chain.log");

        // The second step is only built once the first one reported its pid
        let steps = stream::unfold(None::<u32>, |previous_pid| async move {
            match previous_pid {
                None => {
                    let started = ok("start-app");
                    let pid = started.pid.unwrap_or_default();
                    Some((Ok::<_, Error>(started), Some(pid)))
                }
                Some(0) => None,
                Some(pid) => Some((Ok(ok(&format!("dotnet-stack report -p {}", pid))), Some(0))),
            }
        });

        let report = PipelineRunner::new(&log_path).run(steps).await;
        assert!(report.succeeded());
        assert_eq!(report.steps_logged, 2);
        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.contains("Run Command: dotnet-stack report -p 100"));
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("empty.log");
        let report = PipelineRunner::new(&log_path)
            .run(stream::empty::<Result<InvocationResult>>())
            .await;
        assert_eq!(report.steps_logged, 0);
        assert!(report.succeeded());
        assert!(!log_path.exists());
    }

    #[tokio::test]
    async fn test_record_single() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("analysis").join("oom-linux-x64.log");
        PipelineRunner::record_single(&log_path, &ok("dotnet dotnet-dump.dll analyze"))
            .await
            .unwrap();
        assert_eq!(entries(&log_path), 1);
    }
}
