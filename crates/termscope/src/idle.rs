//! Idle detection
//!
//! The terminal counts as idle once its cursor has stayed put, away from the
//! origin, for a quiet period. Sampling happens on a scoped thread spawned
//! per call; it reports back over a single-shot channel and is stopped and
//! joined before the call returns.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use terminal::{Cursor, Grid};

use crate::cancel::Cancellation;
use crate::error::Error;

/// Cursor sampling period
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Longest single wait for the sampler, so cancellation is noticed promptly
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Polling,
    Settled,
}

/// Tracks cursor movement against a quiet period
#[derive(Debug, Clone)]
pub struct IdleTracker {
    quiet: Duration,
    last: Cursor,
    since: Instant,
}

impl IdleTracker {
    pub fn new(quiet: Duration, cursor: Cursor, now: Instant) -> Self {
        Self {
            quiet,
            last: cursor,
            since: now,
        }
    }

    /// Feed one cursor sample
    ///
    /// Movement restarts the quiet period. A cursor at the origin never
    /// settles, since nothing has been drawn yet.
    pub fn observe(&mut self, cursor: Cursor, now: Instant) -> IdleState {
        if cursor != self.last {
            self.last = cursor;
            self.since = now;
            return IdleState::Polling;
        }

        if !cursor.is_origin() && now.saturating_duration_since(self.since) >= self.quiet {
            IdleState::Settled
        } else {
            IdleState::Polling
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.last
    }
}

/// Block until `grid` has been idle for `quiet`, giving up after `timeout`
/// or when `cancel` fires
pub(crate) fn wait_for_idle(
    grid: &Grid,
    quiet: Duration,
    timeout: Duration,
    cancel: &Cancellation,
) -> Result<Cursor, Error> {
    let started = Instant::now();
    let deadline = cancel.child(timeout);
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::sync_channel::<Cursor>(1);

    let settled = thread::scope(|scope| {
        let stop = &stop;
        scope.spawn(move || {
            let mut tracker = IdleTracker::new(quiet, grid.cursor(), Instant::now());
            while !stop.load(Ordering::Acquire) {
                thread::sleep(SAMPLE_INTERVAL);
                if tracker.observe(grid.cursor(), Instant::now()) == IdleState::Settled {
                    let _ = tx.try_send(tracker.cursor());
                    return;
                }
            }
        });

        let settled = loop {
            if deadline.is_cancelled() {
                break None;
            }
            let wait = deadline
                .remaining()
                .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));
            match rx.recv_timeout(wait) {
                Ok(cursor) => break Some(cursor),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };
        stop.store(true, Ordering::Release);
        settled
    });

    match settled {
        Some(cursor) => {
            tracing::debug!(?cursor, elapsed = ?started.elapsed(), "terminal idle");
            Ok(cursor)
        }
        None => {
            let waited = started.elapsed();
            let backtrace = Backtrace::force_capture();
            tracing::error!(
                ?waited,
                cursor = ?grid.cursor(),
                %backtrace,
                "terminal never went idle"
            );
            Err(Error::Timeout {
                waited,
                criteria: format!("cursor idle for {quiet:?}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(100);

    fn at(row: usize, column: usize) -> Cursor {
        Cursor { row, column }
    }

    #[test]
    fn settles_after_quiet_period() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(QUIET, at(0, 5), t0);

        assert_eq!(tracker.observe(at(0, 5), t0 + Duration::from_millis(50)), IdleState::Polling);
        assert_eq!(tracker.observe(at(0, 5), t0 + QUIET), IdleState::Settled);
    }

    #[test]
    fn movement_resets_baseline() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(QUIET, at(0, 5), t0);

        assert_eq!(tracker.observe(at(0, 6), t0 + Duration::from_millis(90)), IdleState::Polling);
        assert_eq!(tracker.observe(at(0, 6), t0 + Duration::from_millis(150)), IdleState::Polling);
        assert_eq!(tracker.observe(at(0, 6), t0 + Duration::from_millis(190)), IdleState::Settled);
        assert_eq!(tracker.cursor(), at(0, 6));
    }

    #[test]
    fn origin_never_settles() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(QUIET, Cursor::ORIGIN, t0);

        assert_eq!(tracker.observe(Cursor::ORIGIN, t0 + Duration::from_secs(10)), IdleState::Polling);
    }

    #[test]
    fn returning_to_origin_is_not_idle() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(QUIET, at(3, 3), t0);

        tracker.observe(Cursor::ORIGIN, t0 + Duration::from_millis(10));
        assert_eq!(tracker.observe(Cursor::ORIGIN, t0 + Duration::from_secs(1)), IdleState::Polling);
    }

    #[test]
    fn wait_succeeds_on_still_grid() {
        let grid = Grid::new(20, 4);
        grid.write(b"ready");

        let cursor = wait_for_idle(&grid, Duration::from_millis(20), Duration::from_secs(2), &Cancellation::new()).unwrap();
        assert_eq!(cursor, at(0, 5));
    }

    #[test]
    fn wait_times_out_on_blank_grid() {
        let grid = Grid::new(20, 4);

        let started = Instant::now();
        let err = wait_for_idle(&grid, Duration::from_millis(10), Duration::from_millis(50), &Cancellation::new())
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn cancellation_fails_the_wait() {
        let grid = Grid::new(20, 4);
        let cancel = Cancellation::new();
        cancel.cancel();

        let err = wait_for_idle(&grid, Duration::from_millis(10), Duration::from_secs(10), &cancel).unwrap_err();
        assert!(err.is_timeout());
    }
}
