#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use display_switcher::command::{CommandOutput, CommandRunner, SharedRunner};
use display_switcher::config::Configuration;
use display_switcher::error::CommandError;
use display_switcher::mode::DisplayMode;
use display_switcher::surface::{Bounds, EntryHandle, SessionId, Surface};
use futures::FutureExt;
use futures::future::BoxFuture;

pub const APPLY: &str = "hdmi-switch";
pub const DETECT: &str = "detect-display-mode";
pub const REFRESH: &str = "xrandr";
pub const STATUS: &str = "hdmi-control-service";

#[derive(Debug, Clone)]
enum Reply {
    Output {
        stdout: String,
        code: i32,
        delay: Duration,
    },
    SpawnFailure,
}

#[derive(Default)]
struct RunnerState {
    replies: HashMap<String, Reply>,
    runs: Vec<Vec<String>>,
    detached: Vec<Vec<String>>,
    in_flight: usize,
}

/// Counts a scripted run as in flight until its future finishes or is dropped.
struct InFlight(Arc<Mutex<RunnerState>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().unwrap().in_flight -= 1;
    }
}

/// Runner answering by program name. Unscripted programs succeed with empty
/// output; detached spawns are only recorded.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, program: &str, stdout: &str) -> &Self {
        self.reply_after(program, stdout, Duration::ZERO)
    }

    pub fn reply_after(&self, program: &str, stdout: &str, delay: Duration) -> &Self {
        self.set(
            program,
            Reply::Output {
                stdout: stdout.to_string(),
                code: 0,
                delay,
            },
        )
    }

    pub fn exit_code(&self, program: &str, code: i32) -> &Self {
        self.set(
            program,
            Reply::Output {
                stdout: String::new(),
                code,
                delay: Duration::ZERO,
            },
        )
    }

    pub fn fail_spawn(&self, program: &str) -> &Self {
        self.set(program, Reply::SpawnFailure)
    }

    fn set(&self, program: &str, reply: Reply) -> &Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(program.to_string(), reply);
        self
    }

    pub fn shared(&self) -> SharedRunner {
        Arc::new(self.clone())
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn runs_of(&self, program: &str) -> usize {
        self.runs().iter().filter(|argv| argv[0] == program).count()
    }

    /// Runs whose futures are still alive, neither finished nor dropped.
    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    pub fn detached(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().detached.clone()
    }

    /// Mode names passed to the apply command, in spawn order.
    pub fn applied(&self) -> Vec<String> {
        self.detached()
            .into_iter()
            .filter(|argv| argv[0] == APPLY)
            .map(|argv| argv[1..].join(" "))
            .collect()
    }
}

fn spawn_failure(argv: &[String]) -> CommandError {
    CommandError::Spawn {
        argv: argv.join(" "),
        source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> BoxFuture<'static, Result<CommandOutput, CommandError>> {
        let argv = argv.to_vec();
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.runs.push(argv.clone());
            state.in_flight += 1;
            state.replies.get(&argv[0]).cloned()
        };
        let guard = InFlight(self.state.clone());
        async move {
            let _guard = guard;
            match reply {
                None => Ok(CommandOutput {
                    success: true,
                    exit_code: Some(0),
                    ..CommandOutput::default()
                }),
                Some(Reply::SpawnFailure) => Err(spawn_failure(&argv)),
                Some(Reply::Output {
                    stdout,
                    code,
                    delay,
                }) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(CommandOutput {
                        success: code == 0,
                        exit_code: Some(code),
                        stdout,
                        stderr: String::new(),
                    })
                }
            }
        }
        .boxed()
    }

    fn spawn_detached(&self, argv: &[String]) -> Result<(), CommandError> {
        let mut state = self.state.lock().unwrap();
        if matches!(state.replies.get(&argv[0]), Some(Reply::SpawnFailure)) {
            return Err(spawn_failure(argv));
        }
        state.detached.push(argv.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub entries: Vec<(EntryHandle, SessionId, DisplayMode)>,
    pub active: HashMap<EntryHandle, bool>,
    /// Every `set_entry_active(_, true)` call.
    pub active_marks: Vec<DisplayMode>,
    pub highlighted: HashMap<EntryHandle, bool>,
    pub focused: Vec<DisplayMode>,
    pub entrances: Vec<SessionId>,
    pub exits: Vec<SessionId>,
    pub destroyed: Vec<SessionId>,
    pub bounds: Option<Bounds>,
    pub status_visible: Option<bool>,
    pub status_checked: Option<bool>,
    pub status_subtitle: Option<String>,
    pub status_mode: Option<DisplayMode>,
    pub status_removed: bool,
    pub notifications: Vec<(String, String)>,
}

/// Surface that records every call; clones share state so a test can keep
/// one while the controller owns the other.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: Bounds) -> Self {
        let surface = Self::default();
        surface.state.lock().unwrap().bounds = Some(bounds);
        surface
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap()
    }

    fn mode_of(state: &SurfaceState, entry: EntryHandle) -> DisplayMode {
        state
            .entries
            .iter()
            .find(|(handle, _, _)| *handle == entry)
            .map(|(_, _, mode)| *mode)
            .expect("entry was added")
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.state().entries.iter().map(|(_, id, _)| *id).collect();
        ids.dedup();
        ids
    }

    pub fn modes(&self, session: SessionId) -> Vec<DisplayMode> {
        self.state()
            .entries
            .iter()
            .filter(|(_, id, _)| *id == session)
            .map(|(_, _, mode)| *mode)
            .collect()
    }

    fn flagged(&self, session: SessionId, pick: fn(&SurfaceState) -> &HashMap<EntryHandle, bool>) -> Vec<DisplayMode> {
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|(handle, id, _)| *id == session && pick(&state).get(handle).copied().unwrap_or(false))
            .map(|(_, _, mode)| *mode)
            .collect()
    }

    pub fn active(&self, session: SessionId) -> Vec<DisplayMode> {
        self.flagged(session, |s| &s.active)
    }

    pub fn highlighted(&self, session: SessionId) -> Vec<DisplayMode> {
        self.flagged(session, |s| &s.highlighted)
    }
}

impl Surface for RecordingSurface {
    fn add_entry(&mut self, session: SessionId, mode: DisplayMode) -> EntryHandle {
        let mut state = self.state();
        let handle = EntryHandle(state.entries.len() as u64 + 1);
        state.entries.push((handle, session, mode));
        handle
    }

    fn begin_entrance(&mut self, session: SessionId) {
        self.state().entrances.push(session);
    }

    fn begin_exit(&mut self, session: SessionId) {
        self.state().exits.push(session);
    }

    fn destroy_flyout(&mut self, session: SessionId) {
        self.state().destroyed.push(session);
    }

    fn flyout_bounds(&self, _session: SessionId) -> Option<Bounds> {
        self.state().bounds
    }

    fn set_entry_active(&mut self, entry: EntryHandle, active: bool) {
        let mut state = self.state();
        state.active.insert(entry, active);
        if active {
            let mode = Self::mode_of(&state, entry);
            state.active_marks.push(mode);
        }
    }

    fn set_entry_highlight(&mut self, entry: EntryHandle, highlighted: bool) {
        self.state().highlighted.insert(entry, highlighted);
    }

    fn focus_entry(&mut self, entry: EntryHandle) {
        let mut state = self.state();
        let mode = Self::mode_of(&state, entry);
        state.focused.push(mode);
    }

    fn set_status_visible(&mut self, visible: bool) {
        self.state().status_visible = Some(visible);
    }

    fn set_status_checked(&mut self, checked: bool) {
        self.state().status_checked = Some(checked);
    }

    fn set_status_subtitle(&mut self, subtitle: Option<&str>) {
        self.state().status_subtitle = subtitle.map(str::to_string);
    }

    fn set_status_mode(&mut self, mode: Option<DisplayMode>) {
        self.state().status_mode = mode;
    }

    fn remove_status(&mut self) {
        self.state().status_removed = true;
    }

    fn notify(&mut self, title: &str, body: &str) {
        self.state()
            .notifications
            .push((title.to_string(), body.to_string()));
    }
}

/// Defaults with the state file redirected into `dir`.
pub fn test_config(dir: &Path) -> Configuration {
    Configuration {
        state_file: dir.join("state.json"),
        change_path: dir.join("events"),
        control_socket_path: dir.join("control.sock"),
        ..Configuration::default()
    }
}

pub fn write_state(cfg: &Configuration, connected: bool) {
    std::fs::write(
        &cfg.state_file,
        format!(r#"{{"external-monitor-connected": {connected}, "connector": "HDMI-1"}}"#),
    )
    .unwrap();
}
