//! Flyout and cycle controller.
//!
//! A single task owns the flyout session, the status toggle state and every
//! pending timer. External input arrives as [`Command`]s through a
//! [`ControllerHandle`]; subprocess results and timer expirations come back as
//! internal messages on the same task, so session state is only ever mutated
//! in one place. Every asynchronous result names the session (and the timer
//! ticket) it was started for and is dropped if that session is gone.

pub mod session;

use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::SharedRunner;
use crate::config::{Configuration, Timings};
use crate::connection::ConnectionDetector;
use crate::detect::ModeDetector;
use crate::error::CommandError;
use crate::mode::{DetectionResult, DisplayMode};
use crate::surface::{SessionId, Surface};
use crate::switcher::{ModeSwitcher, SwitchOutcome};
use crate::timer::{PendingSlot, Ticket};

pub use session::{FlyoutSession, OptionEntry, Phase};

pub const DISCONNECTED_TITLE: &str = "HDMI Disconnected";
pub const DISCONNECTED_BODY: &str = "The HDMI cable is not connected.";
pub const CANNOT_SWITCH_BODY: &str = "Cannot switch mode without HDMI connection.";

/// Input delivered by the compositor, the change watcher or the control socket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// The global keybinding: cycles when a flyout is open, otherwise checks
    /// the connection and shows the flyout.
    Keybinding,
    /// The watched hardware path settled after a change.
    HardwareChanged,
    Hover(DisplayMode),
    Leave(DisplayMode),
    Click(DisplayMode),
    /// A pointer press anywhere on screen.
    PointerPress { x: f64, y: f64 },
    /// A status-menu entry was activated.
    Select(DisplayMode),
    StatusToggleClicked,
    SettingsChanged { show_status_toggle: bool },
    Disable,
}

#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Returns `false` once the controller has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

#[derive(Debug)]
enum Internal {
    ConnectionChecked {
        ticket: Ticket,
        connected: bool,
    },
    SwitchFinished {
        ticket: Ticket,
        mode: DisplayMode,
        outcome: Result<SwitchOutcome, CommandError>,
    },
    ModeDetected {
        session: SessionId,
        result: DetectionResult,
    },
    ModeReport {
        origin: Option<SessionId>,
        mode: DisplayMode,
        late: bool,
    },
    EntranceDone {
        session: SessionId,
        ticket: Ticket,
    },
    ExitDone {
        session: SessionId,
        ticket: Ticket,
    },
    InactivityElapsed {
        session: SessionId,
        ticket: Ticket,
    },
    AutoApplyElapsed {
        session: SessionId,
        ticket: Ticket,
        mode: DisplayMode,
    },
}

pub struct Controller<S: Surface> {
    surface: S,
    connection: ConnectionDetector,
    detector: ModeDetector,
    switcher: ModeSwitcher,
    timings: Timings,
    show_status_toggle: bool,
    status_alive: bool,
    session: Option<FlyoutSession>,
    sessions_opened: u64,
    connection_check: PendingSlot,
    switch: PendingSlot,
    startup_detection: PendingSlot,
    commands: UnboundedReceiver<Command>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: UnboundedReceiver<Internal>,
}

impl<S: Surface> Controller<S> {
    pub fn new(cfg: &Configuration, runner: SharedRunner, surface: S) -> (Self, ControllerHandle) {
        let connection = ConnectionDetector::from_config(runner.clone(), cfg);
        let detector = ModeDetector::from_config(runner.clone(), cfg);
        let switcher =
            ModeSwitcher::new(runner, connection.clone(), cfg.commands.apply_mode.clone());
        let (tx, commands) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let controller = Self {
            surface,
            connection,
            detector,
            switcher,
            timings: cfg.timings,
            show_status_toggle: cfg.show_status_toggle,
            status_alive: true,
            session: None,
            sessions_opened: 0,
            connection_check: PendingSlot::new("connection-check"),
            switch: PendingSlot::new("switch"),
            startup_detection: PendingSlot::new("startup-detection"),
            commands,
            internal_tx,
            internal_rx,
        };
        (controller, ControllerHandle { tx })
    }

    /// Process input until cancelled, disabled, or every handle is dropped,
    /// then tear down the flyout and the status toggle.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.start();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancel received; stopping controller");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all controller handles dropped");
                        break;
                    }
                },
                Some(message) = self.internal_rx.recv() => self.handle_internal(message),
            }
        }
        self.teardown();
        Ok(())
    }

    fn start(&mut self) {
        if !self.show_status_toggle {
            self.surface.set_status_visible(false);
        }
        self.spawn_detection(None);
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        debug!(?command, "command");
        match command {
            Command::Keybinding => {
                if live(&mut self.session).is_some() {
                    self.cycle();
                } else {
                    self.request_connection_check("keybinding");
                }
            }
            Command::HardwareChanged => self.request_connection_check("hardware change"),
            Command::StatusToggleClicked => self.request_connection_check("status toggle"),
            Command::SettingsChanged { show_status_toggle } => {
                info!(show_status_toggle, "settings changed");
                self.show_status_toggle = show_status_toggle;
                self.request_connection_check("settings change");
            }
            Command::Hover(mode) => self.hover(mode),
            Command::Leave(mode) => self.leave(mode),
            Command::Click(mode) => self.click(mode),
            Command::PointerPress { x, y } => self.pointer_press(x, y),
            Command::Select(mode) => self.begin_switch(mode),
            Command::Disable => {
                info!("disable requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::ConnectionChecked { ticket, connected } => {
                if self.connection_check.complete(ticket) {
                    self.on_connection_checked(connected);
                }
            }
            Internal::SwitchFinished {
                ticket,
                mode,
                outcome,
            } => {
                if self.switch.complete(ticket) {
                    self.on_switch_finished(mode, outcome);
                }
            }
            Internal::ModeDetected { session, result } => self.on_mode_detected(session, result),
            Internal::ModeReport { origin, mode, late } => self.on_mode_report(origin, mode, late),
            Internal::EntranceDone { session, ticket } => {
                let inactivity = self.timings.inactivity;
                let tx = self.internal_tx.clone();
                if let Some(s) = live_with_id(&mut self.session, session) {
                    if s.transition.complete(ticket) && s.mark_open() {
                        debug!(session = %session, "flyout open");
                        restart_inactivity(s, inactivity, tx);
                    }
                }
            }
            Internal::ExitDone { session, ticket } => {
                let finished = self
                    .session
                    .as_mut()
                    .is_some_and(|s| s.id() == session && s.transition.complete(ticket));
                if finished {
                    self.destroy_session();
                }
            }
            Internal::InactivityElapsed { session, ticket } => {
                let expired = live_with_id(&mut self.session, session)
                    .is_some_and(|s| s.inactivity.complete(ticket));
                if expired {
                    self.close_session("inactivity");
                }
            }
            Internal::AutoApplyElapsed {
                session,
                ticket,
                mode,
            } => {
                let due = live_with_id(&mut self.session, session).is_some_and(|s| {
                    s.auto_apply.complete(ticket) && s.highlighted() == Some(mode)
                });
                if due {
                    info!(session = %session, %mode, "auto-applying cycled selection");
                    self.begin_switch(mode);
                } else {
                    debug!(session = %session, %mode, "auto-apply no longer current");
                }
            }
        }
    }

    fn request_connection_check(&mut self, reason: &'static str) {
        debug!(reason, "connection check requested");
        let connection = self.connection.clone();
        let tx = self.internal_tx.clone();
        self.connection_check.spawn(move |ticket| async move {
            let connected = connection.detect().await;
            let _ = tx.send(Internal::ConnectionChecked { ticket, connected });
        });
    }

    fn on_connection_checked(&mut self, connected: bool) {
        self.sync_status(connected);
        if connected {
            self.open_session();
        } else {
            self.close_session("disconnected");
            info!("external display disconnected");
            self.surface.notify(DISCONNECTED_TITLE, DISCONNECTED_BODY);
        }
    }

    fn sync_status(&mut self, connected: bool) {
        if !self.status_alive {
            return;
        }
        if !self.show_status_toggle {
            self.surface.set_status_visible(false);
            return;
        }
        self.surface.set_status_visible(true);
        self.set_status_active(connected);
    }

    fn set_status_active(&mut self, connected: bool) {
        self.surface.set_status_checked(connected);
        self.surface
            .set_status_subtitle((!connected).then_some(DISCONNECTED_TITLE));
    }

    /// Detection runs are owned by the session that asked for them (or by the
    /// controller for the startup run) and are aborted along with it, child
    /// process included.
    fn spawn_detection(&mut self, origin: Option<SessionId>) {
        let detector = self.detector.clone();
        let tx = self.internal_tx.clone();
        let slot = match origin {
            Some(id) => match live_with_id(&mut self.session, id) {
                Some(session) => &mut session.detection,
                None => return,
            },
            None => &mut self.startup_detection,
        };
        slot.spawn(move |_ticket| async move {
            let (result, late) = detector.race(detector.timeout()).await;
            if let DetectionResult::Mode(mode) = result {
                let _ = tx.send(Internal::ModeReport {
                    origin,
                    mode,
                    late: false,
                });
            }
            if let Some(session) = origin {
                let _ = tx.send(Internal::ModeDetected { session, result });
            }
            if let Some(late) = late {
                if let DetectionResult::Mode(mode) = late.finish().await {
                    let _ = tx.send(Internal::ModeReport {
                        origin,
                        mode,
                        late: true,
                    });
                }
            }
        });
    }

    fn on_mode_detected(&mut self, id: SessionId, result: DetectionResult) {
        let Some(session) = live_with_id(&mut self.session, id) else {
            debug!(session = %id, %result, "detection for a closed flyout dropped");
            return;
        };
        match result {
            DetectionResult::Mode(mode) => {
                session.update_indicator(&mut self.surface, mode);
                // Once the user has started cycling, the selection is theirs.
                if session.highlighted().is_none() {
                    session.sync_cycle(mode);
                    session.focus(&mut self.surface, mode);
                } else {
                    debug!(session = %id, %mode, "selection in progress; focus left alone");
                }
            }
            DetectionResult::Unknown => {
                debug!(session = %id, "current mode unknown; nothing marked active");
            }
        }
    }

    /// Late results only move the active checkmark. They never touch the
    /// highlighted selection or a pending auto-apply: what the user picked
    /// takes priority over what the hardware last reported.
    fn on_mode_report(&mut self, origin: Option<SessionId>, mode: DisplayMode, late: bool) {
        if self.status_alive {
            self.surface.set_status_mode(Some(mode));
        }
        if !late {
            return;
        }
        match origin.and_then(|id| live_with_id(&mut self.session, id)) {
            Some(session) => {
                info!(session = %session.id(), %mode, "late update");
                session.update_indicator(&mut self.surface, mode);
            }
            None if origin.is_some() => {
                debug!(%mode, "late detection for a closed flyout dropped");
            }
            None => {}
        }
    }

    fn open_session(&mut self) {
        if let Some(existing) = &self.session {
            debug!(session = %existing.id(), phase = ?existing.phase(), "flyout already present; show ignored");
            return;
        }
        self.sessions_opened += 1;
        let id = SessionId(self.sessions_opened);
        let mut session = FlyoutSession::open(id, &mut self.surface);
        self.surface.begin_entrance(id);
        let tx = self.internal_tx.clone();
        session.transition.schedule(self.timings.entrance, move |ticket| {
            let _ = tx.send(Internal::EntranceDone {
                session: id,
                ticket,
            });
        });
        self.session = Some(session);
        info!(session = %id, "flyout opening");
        self.spawn_detection(Some(id));
    }

    fn close_session(&mut self, reason: &'static str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.begin_closing() {
            return;
        }
        let id = session.id();
        self.surface.begin_exit(id);
        let tx = self.internal_tx.clone();
        session.transition.schedule(self.timings.exit, move |ticket| {
            let _ = tx.send(Internal::ExitDone {
                session: id,
                ticket,
            });
        });
        info!(session = %id, reason, "flyout closing");
    }

    fn destroy_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.teardown();
            self.surface.destroy_flyout(session.id());
            debug!(session = %session.id(), "flyout destroyed");
        }
    }

    fn cycle(&mut self) {
        let timings = self.timings;
        let tx = self.internal_tx.clone();
        let Some(session) = live(&mut self.session) else {
            return;
        };
        let mode = session.cycle();
        let id = session.id();
        session.highlight(&mut self.surface, Some(mode));
        restart_inactivity(session, timings.inactivity, tx.clone());
        session.auto_apply.schedule(timings.auto_apply, move |ticket| {
            let _ = tx.send(Internal::AutoApplyElapsed {
                session: id,
                ticket,
                mode,
            });
        });
        info!(session = %id, %mode, "cycled selection");
    }

    fn hover(&mut self, mode: DisplayMode) {
        let inactivity = self.timings.inactivity;
        let tx = self.internal_tx.clone();
        let Some(session) = live(&mut self.session) else {
            return;
        };
        restart_inactivity(session, inactivity, tx);
        session.highlight(&mut self.surface, Some(mode));
        session.sync_cycle(mode);
        if session.auto_apply.cancel() {
            debug!(session = %session.id(), "hover cancelled pending auto-apply");
        }
    }

    fn leave(&mut self, mode: DisplayMode) {
        if let Some(session) = live(&mut self.session) {
            if session.highlighted() == Some(mode) {
                session.highlight(&mut self.surface, None);
            }
        }
    }

    fn click(&mut self, mode: DisplayMode) {
        let Some(session) = live(&mut self.session) else {
            return;
        };
        session.auto_apply.cancel();
        session.update_indicator(&mut self.surface, mode);
        self.close_session("mode chosen");
        self.begin_switch(mode);
    }

    fn pointer_press(&mut self, x: f64, y: f64) {
        let Some(session) = live(&mut self.session) else {
            return;
        };
        let outside = self
            .surface
            .flyout_bounds(session.id())
            .is_some_and(|bounds| !bounds.contains(x, y));
        if outside {
            self.close_session("click outside");
        }
    }

    fn begin_switch(&mut self, mode: DisplayMode) {
        let switcher = self.switcher.clone();
        let tx = self.internal_tx.clone();
        self.switch.spawn(move |ticket| async move {
            let outcome = switcher.set_mode(mode).await;
            let _ = tx.send(Internal::SwitchFinished {
                ticket,
                mode,
                outcome,
            });
        });
    }

    fn on_switch_finished(&mut self, mode: DisplayMode, outcome: Result<SwitchOutcome, CommandError>) {
        match outcome {
            Ok(SwitchOutcome::Disconnected) => {
                if self.status_alive {
                    self.set_status_active(false);
                }
                self.surface.notify(DISCONNECTED_TITLE, CANNOT_SWITCH_BODY);
            }
            Ok(SwitchOutcome::Applied(applied)) => {
                if self.status_alive {
                    self.set_status_active(true);
                    self.surface.set_status_mode(Some(applied));
                }
                if let Some(session) = live(&mut self.session) {
                    session.update_indicator(&mut self.surface, applied);
                }
                info!(mode = %applied, "display mode set");
                self.close_session("mode applied");
            }
            Err(err) => {
                warn!(%mode, error = %err, "mode switch failed");
                self.close_session("mode switch failed");
            }
        }
    }

    fn teardown(&mut self) {
        self.connection_check.cancel();
        self.switch.cancel();
        self.startup_detection.cancel();
        self.destroy_session();
        if self.status_alive {
            self.surface.remove_status();
            self.status_alive = false;
        }
        info!("controller stopped");
    }
}

fn live(session: &mut Option<FlyoutSession>) -> Option<&mut FlyoutSession> {
    session.as_mut().filter(|s| s.is_live())
}

fn live_with_id(session: &mut Option<FlyoutSession>, id: SessionId) -> Option<&mut FlyoutSession> {
    live(session).filter(|s| s.id() == id)
}

/// Most recent activity wins: the previous inactivity timer is cancelled
/// before the new one starts.
fn restart_inactivity(session: &mut FlyoutSession, delay: Duration, tx: UnboundedSender<Internal>) {
    let id = session.id();
    session.inactivity.schedule(delay, move |ticket| {
        let _ = tx.send(Internal::InactivityElapsed {
            session: id,
            ticket,
        });
    });
}
