use tracing::{error, info, warn};

use crate::command::{SharedRunner, display_args};
use crate::config::Configuration;
use crate::connection::ConnectionDetector;
use crate::error::{CommandError, SwitchError};
use crate::mode::DisplayMode;

/// What [`ModeSwitcher::set_mode`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The apply command was started; the mode is assumed to converge.
    Applied(DisplayMode),
    /// No external display; nothing was started.
    Disconnected,
}

/// Applies a display mode through the external apply command.
///
/// The apply command is fire-and-forget: the switcher never waits for the
/// hardware to reconfigure, and callers update their indicators
/// optimistically from [`SwitchOutcome::Applied`].
#[derive(Clone)]
pub struct ModeSwitcher {
    runner: SharedRunner,
    connection: ConnectionDetector,
    apply: Vec<String>,
}

impl ModeSwitcher {
    pub fn new(runner: SharedRunner, connection: ConnectionDetector, apply: Vec<String>) -> Self {
        Self {
            runner,
            connection,
            apply,
        }
    }

    pub fn from_config(runner: SharedRunner, cfg: &Configuration) -> Self {
        let connection = ConnectionDetector::from_config(runner.clone(), cfg);
        Self::new(runner, connection, cfg.commands.apply_mode.clone())
    }

    /// Re-check the connection, then start the apply command for `mode`.
    pub async fn set_mode(&self, mode: DisplayMode) -> Result<SwitchOutcome, CommandError> {
        if !self.connection.detect().await {
            info!(%mode, "not switching: no external display connected");
            return Ok(SwitchOutcome::Disconnected);
        }
        self.apply(mode)?;
        Ok(SwitchOutcome::Applied(mode))
    }

    /// Start the apply command with the mode's external name as its only
    /// positional argument.
    pub fn apply(&self, mode: DisplayMode) -> Result<(), CommandError> {
        let argv = self.apply_argv(mode);
        info!(%mode, command = %display_args(&argv), "applying display mode");
        self.runner.spawn_detached(&argv).inspect_err(|err| {
            warn!(%mode, error = %err, "failed to start apply command");
        })
    }

    /// Parse an external mode name and switch to it. Names outside the four
    /// known modes are a caller bug: logged, and nothing is spawned.
    pub async fn set_mode_named(&self, name: &str) -> Result<SwitchOutcome, SwitchError> {
        let mode = name.parse::<DisplayMode>().inspect_err(|err| {
            error!(error = %err, "rejecting mode switch");
        })?;
        Ok(self.set_mode(mode).await?)
    }

    fn apply_argv(&self, mode: DisplayMode) -> Vec<String> {
        let mut argv = self.apply.clone();
        argv.push(mode.external_name().to_string());
        argv
    }
}
