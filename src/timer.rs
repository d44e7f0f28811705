//! Cancellable handles for timers and background tasks.
//!
//! A [`PendingSlot`] holds at most one outstanding operation of a given kind.
//! Scheduling a new one aborts the previous one first (cancel-and-replace),
//! and every operation carries a [`Ticket`] so that a completion message that
//! was already queued when it got superseded can still be recognised and
//! dropped.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

#[derive(Debug)]
pub struct PendingSlot {
    kind: &'static str,
    issued: u64,
    pending: Option<(Ticket, AbortHandle)>,
}

impl PendingSlot {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            issued: 0,
            pending: None,
        }
    }

    /// Run `fire` once after `delay`, replacing whatever was pending.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F) -> Ticket
    where
        F: FnOnce(Ticket) + Send + 'static,
    {
        let ticket = self.spawn(move |ticket| async move {
            sleep(delay).await;
            fire(ticket);
        });
        debug!(kind = self.kind, ?delay, ticket = ticket.0, "timer scheduled");
        ticket
    }

    /// Spawn the task built by `task`, replacing whatever was pending.
    pub fn spawn<F, Fut>(&mut self, task: F) -> Ticket
    where
        F: FnOnce(Ticket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.issued += 1;
        let ticket = Ticket(self.issued);
        let handle = tokio::spawn(task(ticket));
        self.pending = Some((ticket, handle.abort_handle()));
        ticket
    }

    /// Abort the pending operation, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some((ticket, handle)) => {
                handle.abort();
                debug!(kind = self.kind, ticket = ticket.0, "pending operation cancelled");
                true
            }
            None => false,
        }
    }

    /// Accept a completion for `ticket`. Returns `false` for superseded or
    /// cancelled tickets, whose results must be discarded.
    pub fn complete(&mut self, ticket: Ticket) -> bool {
        match self.pending {
            Some((current, _)) if current == ticket => {
                self.pending = None;
                true
            }
            _ => {
                debug!(kind = self.kind, ticket = ticket.0, "stale completion dropped");
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
