//! Leading-edge throttle with a single coalescing trailing call

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between outbound position reports
pub const REPORT_INTERVAL: Duration = Duration::from_millis(25);

/// Timer state of a [`Throttle`]
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleState<A> {
    Idle,
    /// A trailing call is pending and will run with `args` at `at`
    Scheduled { at: Instant, args: A },
}

/// Wraps `emit` so it runs at most once per `interval`.
///
/// The first call runs immediately. Calls arriving sooner than `interval`
/// after the last run replace the pending trailing call, which runs once the
/// interval has elapsed with the most recent arguments. Time is supplied by
/// the caller, so the owner decides how to wait for [`Throttle::deadline`].
pub struct Throttle<A, F>
where
    F: FnMut(A),
{
    interval: Duration,
    emit: F,
    last_run: Option<Instant>,
    state: ThrottleState<A>,
}

impl<A, F> Throttle<A, F>
where
    F: FnMut(A),
{
    pub fn new(interval: Duration, emit: F) -> Self {
        Self {
            interval,
            emit,
            last_run: None,
            state: ThrottleState::Idle,
        }
    }

    /// Request an emission with `args` at time `now`
    pub fn call(&mut self, now: Instant, args: A) {
        let due = match self.last_run {
            None => {
                self.run(now, args);
                return;
            }
            Some(last) => last + self.interval,
        };

        if now >= due {
            self.state = ThrottleState::Idle;
            self.run(now, args);
        } else {
            self.state = ThrottleState::Scheduled { at: due, args };
        }
    }

    /// Fire the trailing call if it is due. Returns true when `emit` ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        match std::mem::replace(&mut self.state, ThrottleState::Idle) {
            ThrottleState::Scheduled { at, args } if now >= at => {
                self.run(now, args);
                true
            }
            pending => {
                self.state = pending;
                false
            }
        }
    }

    /// When the pending trailing call should fire, if any
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            ThrottleState::Scheduled { at, .. } => Some(*at),
            ThrottleState::Idle => None,
        }
    }

    /// Drop the pending trailing call without running it
    pub fn cancel(&mut self) {
        self.state = ThrottleState::Idle;
    }

    /// Forget all history; the next call runs immediately
    pub fn reset(&mut self) {
        self.state = ThrottleState::Idle;
        self.last_run = None;
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.state, ThrottleState::Scheduled { .. })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self, now: Instant, args: A) {
        self.last_run = Some(now);
        (self.emit)(args);
    }
}

impl<A, F> fmt::Debug for Throttle<A, F>
where
    A: fmt::Debug,
    F: FnMut(A),
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.interval)
            .field("last_run", &self.last_run)
            .field("state", &self.state)
            .finish()
    }
}
