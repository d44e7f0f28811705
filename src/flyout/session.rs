use tracing::debug;

use crate::mode::DisplayMode;
use crate::surface::{EntryHandle, SessionId, Surface};
use crate::timer::PendingSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionEntry {
    pub mode: DisplayMode,
    pub handle: EntryHandle,
}

/// One open instance of the mode selector.
///
/// Owns its option entries and every timer that refers to it; dropping or
/// tearing down a session cancels those timers.
#[derive(Debug)]
pub struct FlyoutSession {
    id: SessionId,
    phase: Phase,
    entries: Vec<OptionEntry>,
    active: Option<DisplayMode>,
    highlighted: Option<DisplayMode>,
    cycle_index: usize,
    pub(crate) inactivity: PendingSlot,
    pub(crate) auto_apply: PendingSlot,
    pub(crate) transition: PendingSlot,
    pub(crate) detection: PendingSlot,
}

impl FlyoutSession {
    /// Create the session and populate its entries in [`DisplayMode::ORDER`].
    pub fn open(id: SessionId, surface: &mut impl Surface) -> Self {
        let entries = DisplayMode::ORDER
            .into_iter()
            .map(|mode| OptionEntry {
                mode,
                handle: surface.add_entry(id, mode),
            })
            .collect();
        Self {
            id,
            phase: Phase::Opening,
            entries,
            active: None,
            highlighted: None,
            cycle_index: 0,
            inactivity: PendingSlot::new("inactivity"),
            auto_apply: PendingSlot::new("auto-apply"),
            transition: PendingSlot::new("transition"),
            detection: PendingSlot::new("detection"),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Closing sessions ignore input and asynchronous results.
    pub fn is_live(&self) -> bool {
        self.phase != Phase::Closing
    }

    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    pub fn entry(&self, mode: DisplayMode) -> Option<EntryHandle> {
        self.entries
            .iter()
            .find(|entry| entry.mode == mode)
            .map(|entry| entry.handle)
    }

    pub fn active(&self) -> Option<DisplayMode> {
        self.active
    }

    pub fn highlighted(&self) -> Option<DisplayMode> {
        self.highlighted
    }

    /// Mark `mode` as the applied mode and clear the mark everywhere else.
    /// The only place the active-mode checkmark is changed.
    pub fn update_indicator(&mut self, surface: &mut impl Surface, mode: DisplayMode) {
        debug!(session = %self.id, %mode, "updating active indicator");
        for entry in &self.entries {
            surface.set_entry_active(entry.handle, entry.mode == mode);
        }
        self.active = Some(mode);
    }

    /// Move the selection highlight to `mode`, or clear it.
    pub fn highlight(&mut self, surface: &mut impl Surface, mode: Option<DisplayMode>) {
        for entry in &self.entries {
            let on = Some(entry.mode) == mode;
            let was = Some(entry.mode) == self.highlighted;
            if on != was {
                surface.set_entry_highlight(entry.handle, on);
            }
        }
        self.highlighted = mode;
    }

    pub fn focus(&self, surface: &mut impl Surface, mode: DisplayMode) {
        if let Some(handle) = self.entry(mode) {
            surface.focus_entry(handle);
        }
    }

    /// Advance the cycle position, wrapping around.
    pub fn cycle(&mut self) -> DisplayMode {
        self.cycle_index = (self.cycle_index + 1) % DisplayMode::ORDER.len();
        DisplayMode::ORDER[self.cycle_index]
    }

    /// Continue cycling from `mode` on the next press.
    pub fn sync_cycle(&mut self, mode: DisplayMode) {
        self.cycle_index = mode.position();
    }

    pub(crate) fn mark_open(&mut self) -> bool {
        if self.phase == Phase::Opening {
            self.phase = Phase::Open;
            true
        } else {
            false
        }
    }

    /// Enter `Closing`, cancelling every timer and the detection run owned
    /// by the session. Returns `false` if the session was already closing.
    pub(crate) fn begin_closing(&mut self) -> bool {
        if self.phase == Phase::Closing {
            return false;
        }
        self.teardown();
        true
    }

    pub(crate) fn teardown(&mut self) {
        self.phase = Phase::Closing;
        self.inactivity.cancel();
        self.auto_apply.cancel();
        self.transition.cancel();
        self.detection.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Bounds;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Marks {
        next: u64,
        active: HashMap<EntryHandle, bool>,
        highlight_calls: usize,
    }

    impl Surface for Marks {
        fn add_entry(&mut self, _session: SessionId, _mode: DisplayMode) -> EntryHandle {
            self.next += 1;
            EntryHandle(self.next)
        }
        fn begin_entrance(&mut self, _session: SessionId) {}
        fn begin_exit(&mut self, _session: SessionId) {}
        fn destroy_flyout(&mut self, _session: SessionId) {}
        fn flyout_bounds(&self, _session: SessionId) -> Option<Bounds> {
            None
        }
        fn set_entry_active(&mut self, entry: EntryHandle, active: bool) {
            self.active.insert(entry, active);
        }
        fn set_entry_highlight(&mut self, _entry: EntryHandle, _highlighted: bool) {
            self.highlight_calls += 1;
        }
        fn focus_entry(&mut self, _entry: EntryHandle) {}
        fn set_status_visible(&mut self, _visible: bool) {}
        fn set_status_checked(&mut self, _checked: bool) {}
        fn set_status_subtitle(&mut self, _subtitle: Option<&str>) {}
        fn set_status_mode(&mut self, _mode: Option<DisplayMode>) {}
        fn remove_status(&mut self) {}
        fn notify(&mut self, _title: &str, _body: &str) {}
    }

    fn active_count(surface: &Marks) -> usize {
        surface.active.values().filter(|on| **on).count()
    }

    #[test]
    fn update_indicator_is_idempotent() {
        let mut surface = Marks::default();
        let mut session = FlyoutSession::open(SessionId(1), &mut surface);
        assert_eq!(session.entries().len(), DisplayMode::ORDER.len());

        session.update_indicator(&mut surface, DisplayMode::Mirror);
        session.update_indicator(&mut surface, DisplayMode::Mirror);
        assert_eq!(active_count(&surface), 1);
        let mirror = session.entry(DisplayMode::Mirror).unwrap();
        assert_eq!(surface.active.get(&mirror), Some(&true));

        session.update_indicator(&mut surface, DisplayMode::External);
        assert_eq!(active_count(&surface), 1);
        assert_eq!(surface.active.get(&mirror), Some(&false));
        assert_eq!(session.active(), Some(DisplayMode::External));
    }

    #[test]
    fn cycle_wraps_in_flyout_order() {
        let mut surface = Marks::default();
        let mut session = FlyoutSession::open(SessionId(1), &mut surface);
        session.sync_cycle(DisplayMode::Extended);
        assert_eq!(session.cycle(), DisplayMode::External);
        assert_eq!(session.cycle(), DisplayMode::Internal);
        assert_eq!(session.cycle(), DisplayMode::Mirror);
    }

    #[test]
    fn highlight_only_touches_changed_entries() {
        let mut surface = Marks::default();
        let mut session = FlyoutSession::open(SessionId(1), &mut surface);
        session.highlight(&mut surface, Some(DisplayMode::Mirror));
        assert_eq!(surface.highlight_calls, 1);
        session.highlight(&mut surface, Some(DisplayMode::Internal));
        assert_eq!(surface.highlight_calls, 3);
        session.highlight(&mut surface, Some(DisplayMode::Internal));
        assert_eq!(surface.highlight_calls, 3);
    }

    #[test]
    fn closing_is_entered_once() {
        let mut surface = Marks::default();
        let mut session = FlyoutSession::open(SessionId(1), &mut surface);
        assert!(session.mark_open());
        assert!(!session.mark_open());
        assert!(session.begin_closing());
        assert!(!session.is_live());
        assert!(!session.begin_closing());
    }
}
