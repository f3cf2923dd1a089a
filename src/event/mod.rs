//! Lifecycle Events
//!
//! Every observable step of an application's life is reported as a
//! [`LifecycleEvent`] to the configured [`EventLogger`]. The order of events is
//! part of the contract: a run with no hooks that is stopped by a signal
//! produces
//!
//! ```text
//! Provided (one per provided value) → LoggerInitialized → Started → Stopping → Stopped
//! ```
//!
//! Hooks add `OnStartExecuting`/`OnStartExecuted` (or `StartFailed`) and
//! `OnStopExecuting`/`OnStopExecuted` (or `StopFailed`) around each callback.

mod buffer;
mod console;
mod spy;
mod tracing_logger;

pub(crate) use buffer::BufferedLogger;
pub use console::{ConsoleLogger, Format};
pub use spy::Spy;
pub use tracing_logger::TracingLogger;

use crate::lifecycle::ShutdownSignal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why an application began stopping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// An OS signal or a programmatic shutdown request
    Shutdown(ShutdownSignal),
    /// The context passed to `run` was cancelled
    ContextDone,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Shutdown(signal) => write!(f, "{}", signal),
            StopCause::ContextDone => f.write_str("context done"),
        }
    }
}

/// The closed vocabulary of lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, strum_macros::IntoStaticStr)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    /// A constructor or value was registered with the container
    Provided {
        constructor: String,
        output_types: Vec<String>,
        error: Option<String>,
    },
    /// An invoke target ran against the container
    Invoked {
        function: String,
        error: Option<String>,
    },
    /// The event logger itself was constructed
    LoggerInitialized {
        constructor: Option<String>,
        error: Option<String>,
    },
    OnStartExecuting {
        index: usize,
        hook: String,
    },
    OnStartExecuted {
        index: usize,
        hook: String,
        runtime: Duration,
    },
    /// A single OnStart callback failed
    StartFailed {
        index: usize,
        hook: String,
        error: String,
    },
    /// Every OnStart callback succeeded
    Started,
    /// A start failure is being unwound
    RollingBack {
        start_error: String,
    },
    RolledBack {
        error: Option<String>,
    },
    /// Shutdown was triggered
    Stopping {
        cause: StopCause,
    },
    OnStopExecuting {
        index: usize,
        hook: String,
    },
    OnStopExecuted {
        index: usize,
        hook: String,
        runtime: Duration,
    },
    /// A single OnStop callback failed
    StopFailed {
        index: usize,
        hook: String,
        error: String,
    },
    /// Teardown finished, with the aggregated error if any
    Stopped {
        error: Option<String>,
    },
}

impl LifecycleEvent {
    /// Stable tag of the event, e.g. `"Provided"`
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Whether the event reports a failure
    pub fn is_error(&self) -> bool {
        match self {
            LifecycleEvent::StartFailed { .. } | LifecycleEvent::StopFailed { .. } => true,
            LifecycleEvent::Provided { error, .. }
            | LifecycleEvent::Invoked { error, .. }
            | LifecycleEvent::LoggerInitialized { error, .. }
            | LifecycleEvent::RolledBack { error }
            | LifecycleEvent::Stopped { error } => error.is_some(),
            LifecycleEvent::RollingBack { .. } => true,
            _ => false,
        }
    }
}

/// Sink for lifecycle events
pub trait EventLogger: Send + Sync {
    fn log_event(&self, event: &LifecycleEvent);
}

impl<L: EventLogger + ?Sized> EventLogger for Arc<L> {
    fn log_event(&self, event: &LifecycleEvent) {
        (**self).log_event(event);
    }
}

impl<L: EventLogger + ?Sized> EventLogger for Box<L> {
    fn log_event(&self, event: &LifecycleEvent) {
        (**self).log_event(event);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLogger;

impl EventLogger for NopLogger {
    fn log_event(&self, _event: &LifecycleEvent) {}
}
