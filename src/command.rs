use std::process::Stdio;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CommandError;

/// Captured result of an external command that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Starts external programs without blocking the caller.
///
/// `run` resolves once the process has exited and its output is fully
/// captured; spawn failures surface as `Err` from the future, never as a
/// panic. `spawn_detached` starts a fire-and-forget process whose output is
/// discarded.
pub trait CommandRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> BoxFuture<'static, Result<CommandOutput, CommandError>>;

    fn spawn_detached(&self, argv: &[String]) -> Result<(), CommandError>;
}

pub type SharedRunner = Arc<dyn CommandRunner>;

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String]) -> BoxFuture<'static, Result<CommandOutput, CommandError>> {
        let argv = argv.to_vec();
        async move {
            let mut cmd = command_for(&argv)?;
            // Abandoned runs (a cancelled detection) take their child with them.
            cmd.kill_on_drop(true);
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            debug!(command = %display_args(&argv), "running command");
            let output = cmd.output().await.map_err(|source| CommandError::Spawn {
                argv: display_args(&argv),
                source,
            })?;
            Ok(CommandOutput {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        .boxed()
    }

    fn spawn_detached(&self, argv: &[String]) -> Result<(), CommandError> {
        let mut cmd = command_for(argv)?;
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            argv: display_args(argv),
            source,
        })?;
        debug!(command = %display_args(argv), pid = child.id(), "spawned detached command");

        // Reap the child so it does not linger as a zombie.
        let label = display_args(argv);
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(command = %label, "detached command finished"),
                Ok(status) => debug!(command = %label, code = status.code(), "detached command exited non-zero"),
                Err(err) => warn!(command = %label, error = %err, "failed waiting on detached command"),
            }
        });
        Ok(())
    }
}

fn command_for(argv: &[String]) -> Result<Command, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::EmptyArgv)?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

pub fn display_args(argv: &[String]) -> String {
    argv.join(" ")
}
