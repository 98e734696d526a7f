//! Scheduled session work.
//!
//! Timers are never cancelled. Whoever fires them checks whether the work
//! still makes sense at that moment.

use tokio::time::Instant;

/// What to do when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Open a new transport.
    Reconnect,
    /// Re-send the auth request after a rejection.
    AuthRetry,
}

/// Pending timers, fired in deadline order.
#[derive(Debug, Default)]
pub struct Timers {
    pending: Vec<(Instant, TimerKind)>,
}

impl Timers {
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn schedule(&mut self, at: Instant, kind: TimerKind) {
        self.pending.push((at, kind));
    }

    /// Earliest deadline, if anything is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(at, _)| *at).min()
    }

    /// Remove and return everything due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = Vec::new();
        self.pending.retain(|&(at, kind)| {
            if at <= now {
                due.push((at, kind));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    /// Pending timers of the given kind.
    #[must_use]
    pub fn count(&self, kind: TimerKind) -> usize {
        self.pending.iter().filter(|(_, k)| *k == kind).count()
    }
}
