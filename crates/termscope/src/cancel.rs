//! Deadlines and external cancellation for blocking operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation signal with an optional deadline
///
/// Children observe their parents: cancelling a parent (or passing its
/// deadline) cancels every child derived from it, but not the other way
/// round. Blocking operations report a cancelled token as an ordinary
/// timeout.
#[derive(Debug, Clone)]
pub struct Cancellation {
    /// Own flag first, then every ancestor's
    flags: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token that is only cancelled explicitly
    pub fn new() -> Self {
        Self {
            flags: vec![Arc::new(AtomicBool::new(false))],
            deadline: None,
        }
    }

    /// A token that also expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child(timeout)
    }

    /// Derive a token that expires after `timeout` or when `self` does,
    /// whichever comes first
    pub fn child(&self, timeout: Duration) -> Self {
        let own = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut flags = Vec::with_capacity(self.flags.len() + 1);
        flags.push(Arc::new(AtomicBool::new(false)));
        flags.extend(self.flags.iter().cloned());

        Self { flags, deadline }
    }

    /// Combine with another token: the result is cancelled when either is
    pub fn merge(&self, other: &Cancellation) -> Self {
        let deadline = match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut flags = vec![Arc::new(AtomicBool::new(false))];
        flags.extend(self.flags.iter().cloned());
        flags.extend(other.flags.iter().cloned());

        Self { flags, deadline }
    }

    /// Cancel this token and every token derived from it
    pub fn cancel(&self) {
        if let Some(flag) = self.flags.first() {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flags.iter().any(|flag| flag.load(Ordering::Acquire)) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
