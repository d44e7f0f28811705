//! Control socket: newline-delimited JSON commands from the compositor glue,
//! key daemons and the `send` subcommand.
//!
//! ```text
//! {"command":"keybinding"}
//! {"command":"hover","mode":"mirror"}
//! {"command":"pointer-press","x":12.0,"y":640.5}
//! {"command":"screen-locked","locked":true}
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::flyout::{Command, ControllerHandle};
use crate::mode::DisplayMode;
use crate::watch::SharedLock;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlRequest {
    Keybinding,
    HardwareChanged,
    Hover { mode: String },
    Leave { mode: String },
    Click { mode: String },
    PointerPress { x: f64, y: f64 },
    Select { mode: String },
    ToggleClicked,
    #[serde(rename_all = "kebab-case")]
    Settings { show_status_toggle: bool },
    ScreenLocked { locked: bool },
    Disable,
}

/// What a request turns into once decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Controller(Command),
    Lock(bool),
}

impl ControlRequest {
    /// Resolve mode names. An unknown mode name is rejected and logged as an
    /// error; nothing is forwarded for it.
    pub fn into_action(self) -> Option<Action> {
        let command = match self {
            ControlRequest::Keybinding => Command::Keybinding,
            ControlRequest::HardwareChanged => Command::HardwareChanged,
            ControlRequest::Hover { mode } => Command::Hover(parse_mode(&mode)?),
            ControlRequest::Leave { mode } => Command::Leave(parse_mode(&mode)?),
            ControlRequest::Click { mode } => Command::Click(parse_mode(&mode)?),
            ControlRequest::PointerPress { x, y } => Command::PointerPress { x, y },
            ControlRequest::Select { mode } => Command::Select(parse_mode(&mode)?),
            ControlRequest::ToggleClicked => Command::StatusToggleClicked,
            ControlRequest::Settings { show_status_toggle } => {
                Command::SettingsChanged { show_status_toggle }
            }
            ControlRequest::ScreenLocked { locked } => return Some(Action::Lock(locked)),
            ControlRequest::Disable => Command::Disable,
        };
        Some(Action::Controller(command))
    }
}

fn parse_mode(name: &str) -> Option<DisplayMode> {
    name.parse::<DisplayMode>()
        .inspect_err(|err| error!(error = %err, "control request names an unknown mode"))
        .ok()
}

/// Decode one line and deliver it. Returns `false` if the line was rejected.
pub fn dispatch(line: &str, controller: &ControllerHandle, lock: &SharedLock) -> bool {
    let request: ControlRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, line, "malformed control request");
            return false;
        }
    };
    debug!(?request, "control request");
    match request.into_action() {
        Some(Action::Controller(command)) => {
            if !controller.send(command) {
                warn!(?command, "controller is no longer running");
                return false;
            }
            true
        }
        Some(Action::Lock(locked)) => {
            lock.set_locked(locked);
            true
        }
        None => false,
    }
}

#[instrument(skip_all, fields(socket = %path.display()))]
pub async fn serve(
    path: &Path,
    controller: ControllerHandle,
    lock: SharedLock,
    cancel: CancellationToken,
) -> Result<()> {
    if path.exists() {
        debug!("removing stale control socket");
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("failed to bind control socket {}", path.display()))?;
    info!("control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; closing control socket");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let controller = controller.clone();
                    let lock = lock.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(stream, &controller, &lock).await {
                            warn!(error = %err, "control client failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "failed to accept control connection"),
            },
        }
    }

    if let Err(err) = tokio::fs::remove_file(path).await {
        debug!(error = %err, "control socket already gone");
    }
    Ok(())
}

async fn handle_client(stream: UnixStream, controller: &ControllerHandle, lock: &SharedLock) -> Result<()> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            dispatch(line, controller, lock);
        }
    }
    Ok(())
}

/// Write one request to a running daemon.
pub async fn send(path: &Path, request: &str) -> Result<()> {
    serde_json::from_str::<ControlRequest>(request).context("invalid control request")?;
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("failed to connect to control socket at {}", path.display()))?;
    stream
        .write_all(request.trim().as_bytes())
        .await
        .context("failed to send control request")?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Option<Action> {
        serde_json::from_str::<ControlRequest>(line)
            .expect("valid request")
            .into_action()
    }

    #[test]
    fn decodes_mode_commands() {
        assert_eq!(
            decode(r#"{"command":"hover","mode":"join"}"#),
            Some(Action::Controller(Command::Hover(DisplayMode::Extended)))
        );
        assert_eq!(
            decode(r#"{"command":"settings","show-status-toggle":false}"#),
            Some(Action::Controller(Command::SettingsChanged {
                show_status_toggle: false
            }))
        );
        assert_eq!(
            decode(r#"{"command":"screen-locked","locked":true}"#),
            Some(Action::Lock(true))
        );
        assert_eq!(
            decode(r#"{"command":"pointer-press","x":1.5,"y":2}"#),
            Some(Action::Controller(Command::PointerPress { x: 1.5, y: 2.0 }))
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert_eq!(decode(r#"{"command":"click","mode":"extend"}"#), None);
    }

    #[test]
    fn unknown_commands_fail_to_parse() {
        assert!(serde_json::from_str::<ControlRequest>(r#"{"command":"reboot"}"#).is_err());
    }
}
