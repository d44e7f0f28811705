use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::command::{CommandOutput, SharedRunner};
use crate::config::Configuration;
use crate::error::CommandError;
use crate::mode::{DetectionResult, DisplayMode};

/// Receives every valid detection, on-time or late.
///
/// Late reports arrive after [`ModeDetector::detect`] has already resolved
/// `Unknown`; receivers decide whether the UI they would touch still exists.
pub trait ModeReporter: Send + 'static {
    fn report(&self, mode: DisplayMode, late: bool);
}

impl<F> ModeReporter for F
where
    F: Fn(DisplayMode, bool) + Send + 'static,
{
    fn report(&self, mode: DisplayMode, late: bool) {
        self(mode, late)
    }
}

/// Reporter for callers that only care about the returned result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReport;

impl ModeReporter for NoReport {
    fn report(&self, _mode: DisplayMode, _late: bool) {}
}

#[derive(Clone)]
pub struct ModeDetector {
    runner: SharedRunner,
    argv: Vec<String>,
    timeout: Duration,
}

impl ModeDetector {
    pub fn new(runner: SharedRunner, argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner,
            argv,
            timeout,
        }
    }

    pub fn from_config(runner: SharedRunner, cfg: &Configuration) -> Self {
        Self::new(
            runner,
            cfg.commands.detect_mode.clone(),
            cfg.timings.detect_timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// [`ModeDetector::detect_within`] with the configured timeout.
    pub async fn detect<R: ModeReporter>(&self, reporter: R) -> DetectionResult {
        self.detect_within(self.timeout, reporter).await
    }

    /// Race the detection command against `timeout`.
    ///
    /// If the command wins, its parsed result is returned and reported. If the
    /// timer wins, `Unknown` is returned at once while the command keeps
    /// running; a valid result it produces later is reported with `late = true`.
    pub async fn detect_within<R: ModeReporter>(
        &self,
        timeout: Duration,
        reporter: R,
    ) -> DetectionResult {
        let (result, late) = self.race(timeout).await;
        if let DetectionResult::Mode(mode) = result {
            reporter.report(mode, false);
        }
        if let Some(late) = late {
            tokio::spawn(async move {
                if let DetectionResult::Mode(mode) = late.finish().await {
                    reporter.report(mode, true);
                }
            });
        }
        result
    }

    /// Race the detection command against `timeout` without spawning.
    ///
    /// On timeout the still-running command comes back as a [`LateDetection`]
    /// owned by the caller; dropping it abandons the command.
    pub async fn race(&self, timeout: Duration) -> (DetectionResult, Option<LateDetection>) {
        let mut run = self.runner.run(&self.argv);

        tokio::select! {
            biased;

            output = &mut run => {
                let result = interpret(output);
                if let DetectionResult::Mode(mode) = result {
                    info!(%mode, "display mode detected");
                }
                (result, None)
            }
            _ = sleep(timeout) => {
                warn!(timeout = ?timeout, "mode detection timed out; falling back to unknown");
                (DetectionResult::Unknown, Some(LateDetection(run)))
            }
        }
    }
}

/// A detection command that outlived its timeout.
pub struct LateDetection(BoxFuture<'static, Result<CommandOutput, CommandError>>);

impl LateDetection {
    pub async fn finish(self) -> DetectionResult {
        let result = interpret(self.0.await);
        if let DetectionResult::Mode(mode) = result {
            info!(%mode, "display mode detected (late)");
        }
        result
    }
}

fn interpret(output: Result<CommandOutput, CommandError>) -> DetectionResult {
    let output = match output {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, "failed to run mode detection command");
            return DetectionResult::Unknown;
        }
    };

    let result = DetectionResult::from_stdout(&output.stdout);
    if result == DetectionResult::Unknown {
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            warn!(stderr = %stderr, code = output.exit_code, "mode detection reported an error");
        } else {
            debug!(stdout = %output.stdout.trim(), code = output.exit_code, "mode detection produced no known mode");
        }
    }
    result
}
