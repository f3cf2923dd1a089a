//! Time source used for phase deadlines
//!
//! Production code uses [`SystemClock`]. Tests inject a [`MockClock`] and move
//! time forward by hand, which makes timeout behaviour deterministic.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Abstraction over wall-clock time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> Instant;

    /// A future that completes once `duration` has elapsed on this clock
    fn after(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn after(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

struct Timer {
    deadline: Duration,
    fire: oneshot::Sender<()>,
}

struct MockState {
    elapsed: Duration,
    timers: Vec<Timer>,
}

/// Manually driven clock
///
/// Time only moves when [`MockClock::add`] is called. Pending [`Clock::after`]
/// futures complete as soon as the clock reaches their deadline.
///
/// ```
/// use conductor::clock::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// clock.add(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// ```
pub struct MockClock {
    base: Instant,
    state: Mutex<MockState>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(MockState {
                elapsed: Duration::ZERO,
                timers: Vec::new(),
            }),
        }
    }

    /// Move the clock forward, firing every timer that became due
    pub fn add(&self, duration: Duration) {
        let due = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.elapsed += duration;
            let now = state.elapsed;
            let (due, pending): (Vec<_>, Vec<_>) =
                state.timers.drain(..).partition(|t| t.deadline <= now);
            state.timers = pending;
            due
        };
        for timer in due {
            let _ = timer.fire.send(());
        }
    }

    /// Number of timers still waiting; tests use it to know a phase is blocked
    pub fn pending_timers(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.timers.iter().filter(|t| !t.fire.is_closed()).count()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + state.elapsed
    }

    fn after(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let deadline = state.elapsed.saturating_add(duration);
            if deadline <= state.elapsed {
                let _ = tx.send(());
            } else {
                state.timers.push(Timer { deadline, fire: tx });
            }
        }
        async move {
            // A dropped clock never fires; treat it as a timer that never expires.
            if rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        .boxed()
    }
}
