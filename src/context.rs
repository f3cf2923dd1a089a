//! Cancellation and deadline plumbing for lifecycle phases

use crate::clock::Clock;
use crate::error::{Error, Phase, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Caller-supplied cancellation scope for `start`, `stop` and `run`
///
/// A context carries a cancellation token and an optional timeout. The timeout
/// is turned into a deadline by the application's [`Clock`] when a phase
/// begins; no timeout means the phase waits for its hooks indefinitely.
/// Hooks receive a child context and should return early once it is cancelled.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl Context {
    /// A context that is never cancelled and has no timeout
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context whose timeout is at most `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let timeout = match self.timeout {
            Some(current) => current.min(timeout),
            None => timeout,
        };
        Self {
            token: self.token.clone(),
            timeout: Some(timeout),
        }
    }

    /// Like [`Context::with_timeout`], leaving the context unchanged for `None`
    pub fn with_optional_timeout(&self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => self.with_timeout(timeout),
            None => self.clone(),
        }
    }

    /// A context cancelled together with this one, but cancellable on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            timeout: self.timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

enum Outcome<T> {
    Done(T),
    Cancelled,
    Expired,
}

/// Deadline shared by every hook invocation of one phase
pub(crate) struct Deadline {
    phase: Phase,
    timeout: Option<Duration>,
    timer: Option<BoxFuture<'static, ()>>,
    expired: bool,
}

impl Deadline {
    pub(crate) fn start(clock: &dyn Clock, phase: Phase, timeout: Option<Duration>) -> Self {
        Self {
            phase,
            timeout,
            timer: timeout.map(|t| clock.after(t)),
            expired: false,
        }
    }

    /// Fail fast when the phase can no longer make progress
    pub(crate) fn check(&self, ctx: &Context) -> Result<()> {
        if self.expired {
            return Err(self.timeout_error());
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled { phase: self.phase });
        }
        Ok(())
    }

    /// Wait for `fut`, giving up when the deadline passes or `ctx` is cancelled
    ///
    /// On expiry `ctx` is cancelled so that the abandoned hook can notice.
    pub(crate) async fn race<F: Future>(&mut self, ctx: &Context, fut: F) -> Result<F::Output> {
        self.check(ctx)?;
        let outcome = {
            let timer = &mut self.timer;
            let expire = async {
                match timer {
                    Some(timer) => timer.await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                out = fut => Outcome::Done(out),
                _ = ctx.cancelled() => Outcome::Cancelled,
                _ = expire => Outcome::Expired,
            }
        };
        match outcome {
            Outcome::Done(out) => Ok(out),
            Outcome::Cancelled => Err(Error::Cancelled { phase: self.phase }),
            Outcome::Expired => {
                self.expired = true;
                ctx.cancel();
                Err(self.timeout_error())
            }
        }
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            phase: self.phase,
            timeout: self.timeout.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    #[test]
    fn test_with_timeout_keeps_tightest_bound() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert_eq!(
            ctx.with_timeout(Duration::from_secs(10)).timeout(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            ctx.with_timeout(Duration::from_secs(1)).timeout(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(ctx.with_optional_timeout(None).timeout(), ctx.timeout());
    }

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_expiry_cancels_phase_context() {
        let clock = MockClock::new();
        let ctx = Context::background();
        let mut deadline = Deadline::start(&clock, Phase::Start, Some(Duration::from_secs(1)));

        clock.add(Duration::from_secs(2));
        let result = deadline.race(&ctx, std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Timeout { phase: Phase::Start, .. })));
        assert!(ctx.is_cancelled());

        // once expired, every later hook is refused immediately
        assert!(matches!(deadline.check(&Context::background()), Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_ready_future_wins_over_missing_deadline() {
        let clock = MockClock::new();
        let ctx = Context::background();
        let mut deadline = Deadline::start(&clock, Phase::Stop, None);
        assert_eq!(deadline.race(&ctx, async { 7 }).await.unwrap(), 7);
    }
}
