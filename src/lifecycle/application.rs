//! Application
//!
//! Ties the container, the hook registry, shutdown arbitration and the event
//! logger together and drives them through
//!
//! ```text
//! Idle → Starting → Running → Stopping → Stopped
//!           ↓                    ↓
//!         Failed ←───────────────┘ (teardown could not finish)
//! ```

use super::builder::ApplicationBuilder;
use super::registry::Lifecycle;
use super::shutdown::{ShutdownOption, ShutdownSignal, ShutdownWait, Shutdowner, SignalReceivers};
use super::signals::Signal;
use crate::clock::Clock;
use crate::context::{Context, Deadline};
use crate::di::Container;
use crate::error::{Error, Phase, Result};
use crate::event::{EventLogger, LifecycleEvent, StopCause};
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub(crate) type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Position of an application in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum AppState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// A start failed, or a stop could not tear everything down; terminal
    Failed,
}

/// Process exit status for the outcome of a run
///
/// An exit code requested through [`Shutdowner::shutdown`] wins when it is
/// non-zero; otherwise any error maps to its own non-zero code and a clean run
/// to `0`.
pub fn exit_code(result: &Result<()>, signal: Option<&ShutdownSignal>) -> i32 {
    let requested = signal.and_then(|s| s.exit_code).filter(|code| *code != 0);
    match (requested, result) {
        (Some(code), _) => code,
        (None, Err(err)) => err.exit_code(),
        (None, Ok(())) => 0,
    }
}

/// A built application, ready to start
///
/// # Example
///
/// ```rust,no_run
/// use conductor::{Application, Context, Hook, Lifecycle};
///
/// #[tokio::main]
/// async fn main() {
///     let app = Application::builder()
///         .invoke(|c| {
///             c.resolve::<Lifecycle>()?.append(
///                 Hook::named("worker")
///                     .on_start(|_ctx| async { Ok(()) })
///                     .on_stop(|_ctx| async { Ok(()) }),
///             );
///             Ok(())
///         })
///         .build()
///         .expect("Failed to build application");
///
///     // Blocks until SIGINT/SIGTERM or a programmatic shutdown.
///     app.run(&Context::background()).await;
/// }
/// ```
pub struct Application {
    pub(crate) container: Arc<Container>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) receivers: SignalReceivers,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) logger: Arc<dyn EventLogger>,
    pub(crate) exit: ExitFn,
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) stop_timeout: Option<Duration>,
    pub(crate) validate: bool,
    pub(crate) state: Mutex<AppState>,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Get a reference to the container
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Get a reference to the hook registry
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> AppState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deadline `run` applies to the start phase
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout
    }

    /// Deadline `run` applies to the stop phase
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout
    }

    /// Whether this application was built with
    /// [`validate(true)`](ApplicationBuilder::validate) and so never starts
    pub fn is_validation(&self) -> bool {
        self.validate
    }

    pub fn shutdowner(&self) -> Shutdowner {
        self.receivers.shutdowner()
    }

    /// Request shutdown; see [`Shutdowner::shutdown`]
    pub fn shutdown(&self, options: impl IntoIterator<Item = ShutdownOption>) -> bool {
        self.receivers.shutdowner().shutdown(options)
    }

    fn log(&self, event: LifecycleEvent) {
        self.logger.log_event(&event);
    }

    fn set_state(&self, next: AppState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Run every OnStart hook in registration order
    ///
    /// The context's timeout bounds the whole phase. If a hook fails or the
    /// deadline passes, the hooks that already started are stopped in reverse
    /// order before the error is returned, and the application becomes
    /// [`AppState::Failed`].
    ///
    /// Starting does not subscribe to OS signals; only [`wait`](Self::wait),
    /// [`done`](Self::done) and [`run`](Self::run) do. A validation-only
    /// application stays idle and returns `Ok`.
    pub async fn start(&self, ctx: &Context) -> Result<()> {
        if self.validate {
            return Ok(());
        }
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                AppState::Idle | AppState::Stopped => *state = AppState::Starting,
                other => {
                    return Err(Error::InvalidState {
                        action: "start",
                        state: other,
                    });
                }
            }
        }
        tracing::info!("Starting application ({} hooks)...", self.lifecycle.len());

        let phase_ctx = ctx.child();
        let mut deadline = Deadline::start(&*self.clock, Phase::Start, ctx.timeout());
        match self.lifecycle.run_starts(&phase_ctx, &mut deadline).await {
            Ok(()) => {
                self.set_state(AppState::Running);
                self.log(LifecycleEvent::Started);
                tracing::info!("Application started");
                Ok(())
            }
            Err(err) => {
                let err = self.rollback(err).await;
                self.set_state(AppState::Failed);
                Err(err)
            }
        }
    }

    /// Stop whatever started before a start failure
    async fn rollback(&self, cause: Error) -> Error {
        self.log(LifecycleEvent::RollingBack {
            start_error: cause.to_string(),
        });
        // The start context may be the one that expired, so teardown gets its own.
        let ctx = Context::background().with_optional_timeout(self.stop_timeout);
        let mut deadline = Deadline::start(&*self.clock, Phase::Stop, ctx.timeout());
        let result = self.lifecycle.run_stops(&ctx, &mut deadline).await;
        self.log(LifecycleEvent::RolledBack {
            error: result.as_ref().err().map(ToString::to_string),
        });
        match result {
            Ok(()) => cause,
            Err(rollback) => Error::Rollback {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            },
        }
    }

    /// Run OnStop for every started hook, in reverse start order
    ///
    /// Failing hooks do not prevent the others from stopping; their errors are
    /// aggregated. Stopping an application that is not running is a no-op.
    pub async fn stop(&self, ctx: &Context) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                AppState::Running => *state = AppState::Stopping,
                AppState::Idle | AppState::Stopped | AppState::Failed => return Ok(()),
                other => {
                    return Err(Error::InvalidState {
                        action: "stop",
                        state: other,
                    });
                }
            }
        }
        tracing::info!("Shutting down application...");

        let phase_ctx = ctx.child();
        let mut deadline = Deadline::start(&*self.clock, Phase::Stop, ctx.timeout());
        let result = self.lifecycle.run_stops(&phase_ctx, &mut deadline).await;
        self.receivers.reset();

        // Hook errors still count as stopped; an aborted phase does not.
        let aborted = matches!(&result, Err(err) if interrupted(err));
        if aborted || self.lifecycle.num_started() > 0 {
            self.set_state(AppState::Failed);
        } else {
            self.set_state(AppState::Stopped);
        }
        self.log(LifecycleEvent::Stopped {
            error: result.as_ref().err().map(ToString::to_string),
        });
        tracing::info!("Application shutdown complete");
        result
    }

    /// Arm OS signal handling and return a waiter for the shutdown cause
    ///
    /// Signals are subscribed to on the first call only; later calls share
    /// the same subscription until the application stops. The handlers are
    /// in place by the time this returns.
    ///
    /// With the default [`OsSignals`](super::OsSignals) notifier, stopping
    /// ends the relay but does not give SIGINT/SIGTERM back their default
    /// action: tokio never uninstalls a process signal handler. From the
    /// first `wait` on, those signals no longer terminate the host process.
    pub fn wait(&self) -> ShutdownWait {
        self.receivers.wait()
    }

    /// Like [`wait`](Self::wait), resolving to the signal alone
    pub fn done(&self) -> impl Future<Output = Signal> + Send + 'static {
        let wait = self.wait();
        async move { wait.recv().await.signal }
    }

    /// Start, block until shutdown is requested, then stop
    ///
    /// The start and stop phases are bounded by the application's timeouts
    /// (and by the context's own timeout). Waiting ends on an OS signal, a
    /// [`Shutdowner`] request, cancellation of `ctx`, or expiry of its
    /// timeout. Returns the exit status; a non-zero status is also passed to
    /// the exit function, which terminates the process by default.
    ///
    /// A validation-only application returns `0` without starting.
    pub async fn run(&self, ctx: &Context) -> i32 {
        if self.validate {
            tracing::info!("Validation only, not running the application");
            return 0;
        }
        let (result, signal) = self.run_to_completion(ctx).await;
        if let Err(err) = &result {
            tracing::error!("Application run failed: {}", err);
        }
        let code = exit_code(&result, signal.as_ref());
        if code != 0 {
            (self.exit)(code);
        }
        code
    }

    async fn run_to_completion(&self, ctx: &Context) -> (Result<()>, Option<ShutdownSignal>) {
        let expiry = match ctx.timeout() {
            Some(timeout) => self.clock.after(timeout),
            None => std::future::pending::<()>().boxed(),
        };

        let start_ctx = ctx.with_optional_timeout(self.start_timeout);
        if let Err(err) = self.start(&start_ctx).await {
            return (Err(err), None);
        }

        let wait = self.wait();
        let cause = tokio::select! {
            signal = wait.recv() => StopCause::Shutdown(signal),
            _ = ctx.cancelled() => StopCause::ContextDone,
            _ = expiry => StopCause::ContextDone,
        };
        self.log(LifecycleEvent::Stopping {
            cause: cause.clone(),
        });

        let stop_ctx = Context::background().with_optional_timeout(self.stop_timeout);
        let result = self.stop(&stop_ctx).await;
        let signal = match cause {
            StopCause::Shutdown(signal) => Some(signal),
            StopCause::ContextDone => None,
        };
        (result, signal)
    }
}

fn interrupted(err: &Error) -> bool {
    match err {
        Error::Timeout { .. } | Error::Cancelled { .. } => true,
        Error::Aggregate(errors) => errors.iter().any(interrupted),
        _ => false,
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.receivers.disarm();
    }
}
