//! Change watcher for the hardware event path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Whether the session is currently locked. Changes seen while locked are
/// dropped, not queued.
pub trait LockState: Send + Sync + 'static {
    fn is_locked(&self) -> bool;
}

/// Lock flag shared between the control socket (which receives lock and
/// unlock notifications) and the watcher.
#[derive(Debug, Clone, Default)]
pub struct SharedLock(Arc<AtomicBool>);

impl SharedLock {
    pub fn set_locked(&self, locked: bool) {
        let was = self.0.swap(locked, Ordering::SeqCst);
        if was != locked {
            info!(locked, "screen lock state changed");
        }
    }
}

impl LockState for SharedLock {
    fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ChangeWatcher<L, F> {
    path: PathBuf,
    lock: L,
    trigger: F,
}

impl<L, F> ChangeWatcher<L, F>
where
    L: LockState,
    F: Fn() + Send + 'static,
{
    pub fn new(path: impl Into<PathBuf>, lock: L, trigger: F) -> Self {
        Self {
            path: path.into(),
            lock,
            trigger,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fire the trigger for a settled change of the watched path while
    /// unlocked. Returns whether the trigger ran.
    pub fn handle(&self, event: &Event) -> bool {
        if !event.paths.iter().any(|p| p.starts_with(&self.path)) {
            return false;
        }
        if !is_settled(&event.kind) {
            debug!(kind = ?event.kind, "change ignored");
            return false;
        }
        if self.lock.is_locked() {
            info!(paths = ?event.paths, "change dropped while screen is locked");
            return false;
        }
        info!(paths = ?event.paths, "hardware change settled");
        (self.trigger)();
        true
    }

    /// Resolve the directory to watch. A file is watched through its parent
    /// so that replacing it by rename does not strand the watch on the old
    /// inode; `self.path` is made absolute to match notify's event paths.
    fn watch_root(&mut self) -> Option<PathBuf> {
        if self.path.is_dir() {
            self.path = self.path.canonicalize().ok()?;
            return Some(self.path.clone());
        }
        let name = self.path.file_name()?.to_owned();
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let root = parent.canonicalize().ok()?;
        self.path = root.join(name);
        Some(root)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let Some(root) = self.watch_root() else {
            warn!("change path directory does not exist; hardware changes will not be watched");
            return Ok(());
        };
        if !self.path.exists() {
            debug!("change path not created yet; watching its directory");
        }

        let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(64);
        let mut watcher = recommended_watcher(move |res| {
            let _ = watch_tx.blocking_send(res);
        })
        .context("failed to create change watcher")?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        info!(root = %root.display(), "change watcher initialized");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancel received; exiting change watcher");
                    break;
                }
                Some(res) = watch_rx.recv() => match res {
                    Ok(event) => {
                        self.handle(&event);
                    }
                    Err(err) => error!("watch error: {err}"),
                },
            }
        }
        Ok(())
    }
}

/// Only a finished write counts as "changes settled". Creation, intermediate
/// modify events and renames are ignored; a write always ends in a close.
fn is_settled(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Access(AccessKind::Close(AccessMode::Write)))
}
