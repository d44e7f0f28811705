//! Daemon and one-shot commands for the display switcher.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use display_switcher::command::{ProcessRunner, SharedRunner};
use display_switcher::config::Configuration;
use display_switcher::connection::ConnectionDetector;
use display_switcher::control;
use display_switcher::detect::{ModeDetector, NoReport};
use display_switcher::flyout::{Command, Controller, ControllerHandle};
use display_switcher::logging;
use display_switcher::surface::HeadlessSurface;
use display_switcher::switcher::{ModeSwitcher, SwitchOutcome};
use display_switcher::watch::{ChangeWatcher, SharedLock};

#[derive(Debug, Parser)]
#[command(
    name = "display-switcher",
    version,
    about = "Switch between internal, mirrored, extended and external display modes"
)]
struct Cli {
    /// Path to YAML config (defaults to the per-user config file)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the daemon (default)
    Run,
    /// Print whether an external display is connected
    Detect,
    /// Print the current display mode, or `unknown`
    Mode,
    /// Switch to a display mode: internal, mirror, join or external
    Set { mode: String },
    /// Send a JSON control command to a running daemon
    Send { request: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let cfg = Configuration::load(cli.config.as_deref())?;
    debug!(?cfg, "configuration loaded");
    let runner: SharedRunner = Arc::new(ProcessRunner);

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => run(cfg, runner).await,
        Cmd::Detect => {
            let connected = ConnectionDetector::from_config(runner, &cfg).detect().await;
            println!("{}", if connected { "connected" } else { "disconnected" });
            Ok(())
        }
        Cmd::Mode => {
            let result = ModeDetector::from_config(runner, &cfg).detect(NoReport).await;
            println!("{result}");
            Ok(())
        }
        Cmd::Set { mode } => {
            match ModeSwitcher::from_config(runner, &cfg)
                .set_mode_named(&mode)
                .await?
            {
                SwitchOutcome::Applied(mode) => {
                    println!("{mode}");
                    Ok(())
                }
                SwitchOutcome::Disconnected => {
                    bail!("cannot switch mode without an external display connected")
                }
            }
        }
        Cmd::Send { request } => control::send(&cfg.control_socket_path, &request).await,
    }
}

async fn run(cfg: Configuration, runner: SharedRunner) -> Result<()> {
    let surface = HeadlessSurface::new(
        runner.clone(),
        cfg.commands.notify.clone(),
        cfg.flyout_bounds,
    );
    let (controller, handle) = Controller::new(&cfg, runner, surface);
    let lock = SharedLock::default();
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    spawn_signal_handlers(handle.clone(), cancel.clone());

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let cancel = cancel.clone();
        async move {
            let result = controller
                .run(cancel.clone())
                .await
                .context("controller failed");
            // Nothing else is useful once the controller has stopped.
            cancel.cancel();
            result
        }
    });

    tasks.spawn({
        let handle = handle.clone();
        let watcher = ChangeWatcher::new(cfg.change_path.clone(), lock.clone(), move || {
            handle.send(Command::HardwareChanged);
        });
        let cancel = cancel.clone();
        async move { watcher.run(cancel).await.context("change watcher failed") }
    });

    tasks.spawn({
        let path = cfg.control_socket_path.clone();
        let cancel = cancel.clone();
        async move {
            control::serve(&path, handle, lock, cancel)
                .await
                .context("control socket failed")
        }
    });

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task error: {e:?}"),
            Err(e) => error!("join error: {e}"),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn spawn_signal_handlers(handle: ControllerHandle, cancel: CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    tokio::spawn(async move {
        match signal(SignalKind::user_defined1()) {
            Ok(mut sigusr1) => loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = sigusr1.recv() => {
                        if received.is_none() {
                            break;
                        }
                        info!("SIGUSR1 received; keybinding pressed");
                        if !handle.send(Command::Keybinding) {
                            warn!("controller stopped; ignoring keybinding");
                            break;
                        }
                    }
                }
            },
            Err(err) => warn!("failed to register SIGUSR1 handler: {err}"),
        }
    });
}
