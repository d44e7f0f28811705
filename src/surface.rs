//! Boundary to the toolkit that renders the flyout and the status toggle.
//!
//! The controller only ever talks to a [`Surface`]; it never inspects a widget
//! tree. [`HeadlessSurface`] is the daemon's implementation: it has no widgets,
//! logs what would be drawn and delivers notifications through a desktop
//! notification command.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::command::SharedRunner;
use crate::mode::DisplayMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle for one selectable option inside a flyout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(pub u64);

/// Screen rectangle of the flyout, in stage coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

pub trait Surface: Send + 'static {
    /// Add an option for `mode` to the flyout of `session`, creating the
    /// flyout on first use. Entries appear in call order.
    fn add_entry(&mut self, session: SessionId, mode: DisplayMode) -> EntryHandle;
    fn begin_entrance(&mut self, session: SessionId);
    fn begin_exit(&mut self, session: SessionId);
    fn destroy_flyout(&mut self, session: SessionId);
    fn flyout_bounds(&self, session: SessionId) -> Option<Bounds>;

    /// The checkmark showing which mode is currently applied.
    fn set_entry_active(&mut self, entry: EntryHandle, active: bool);
    /// The hover/cycle highlight showing which mode is about to be applied.
    fn set_entry_highlight(&mut self, entry: EntryHandle, highlighted: bool);
    fn focus_entry(&mut self, entry: EntryHandle);

    fn set_status_visible(&mut self, visible: bool);
    fn set_status_checked(&mut self, checked: bool);
    fn set_status_subtitle(&mut self, subtitle: Option<&str>);
    /// Mark `mode` as the current selection in the status menu.
    fn set_status_mode(&mut self, mode: Option<DisplayMode>);
    fn remove_status(&mut self);

    fn notify(&mut self, title: &str, body: &str);
}

/// Surface for running without a compositor.
///
/// Where the flyout sits on screen is fixed by configuration; without it,
/// pointer presses can never land outside the flyout.
pub struct HeadlessSurface {
    runner: SharedRunner,
    notify: Vec<String>,
    bounds: Option<Bounds>,
    next_entry: u64,
    entries: HashMap<EntryHandle, (SessionId, DisplayMode)>,
}

impl HeadlessSurface {
    pub fn new(runner: SharedRunner, notify: Vec<String>, bounds: Option<Bounds>) -> Self {
        Self {
            runner,
            notify,
            bounds,
            next_entry: 0,
            entries: HashMap::new(),
        }
    }

    fn describe(&self, entry: EntryHandle) -> String {
        match self.entries.get(&entry) {
            Some((session, mode)) => format!("{session}/{mode}"),
            None => format!("entry {}", entry.0),
        }
    }
}

impl Surface for HeadlessSurface {
    fn add_entry(&mut self, session: SessionId, mode: DisplayMode) -> EntryHandle {
        self.next_entry += 1;
        let handle = EntryHandle(self.next_entry);
        self.entries.insert(handle, (session, mode));
        debug!(%session, %mode, label = mode.label(), "flyout entry added");
        handle
    }

    fn begin_entrance(&mut self, session: SessionId) {
        info!(%session, "flyout shown");
    }

    fn begin_exit(&mut self, session: SessionId) {
        info!(%session, "flyout hiding");
    }

    fn destroy_flyout(&mut self, session: SessionId) {
        self.entries.retain(|_, (owner, _)| *owner != session);
        debug!(%session, "flyout destroyed");
    }

    fn flyout_bounds(&self, session: SessionId) -> Option<Bounds> {
        self.bounds
            .filter(|_| self.entries.values().any(|(owner, _)| *owner == session))
    }

    fn set_entry_active(&mut self, entry: EntryHandle, active: bool) {
        if active {
            info!(entry = %self.describe(entry), "active mode marked");
        }
    }

    fn set_entry_highlight(&mut self, entry: EntryHandle, highlighted: bool) {
        debug!(entry = %self.describe(entry), highlighted, "highlight changed");
    }

    fn focus_entry(&mut self, entry: EntryHandle) {
        debug!(entry = %self.describe(entry), "focus moved");
    }

    fn set_status_visible(&mut self, visible: bool) {
        debug!(visible, "status toggle visibility");
    }

    fn set_status_checked(&mut self, checked: bool) {
        info!(checked, "status toggle");
    }

    fn set_status_subtitle(&mut self, subtitle: Option<&str>) {
        debug!(subtitle = subtitle.unwrap_or(""), "status subtitle");
    }

    fn set_status_mode(&mut self, mode: Option<DisplayMode>) {
        debug!(mode = ?mode, "status menu selection");
    }

    fn remove_status(&mut self) {
        debug!("status toggle removed");
    }

    fn notify(&mut self, title: &str, body: &str) {
        info!(title, body, "notification");
        let mut argv = self.notify.clone();
        argv.push(title.to_string());
        argv.push(body.to_string());
        if let Err(err) = self.runner.spawn_detached(&argv) {
            warn!(error = %err, "failed to deliver notification");
        }
    }
}
