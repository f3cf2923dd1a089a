//! Shutdown arbitration
//!
//! OS signals, [`Shutdowner::shutdown`] calls and the application itself all
//! deliver into one [`ShutdownState`]. The first cause delivered in a run
//! wins; later ones are dropped without blocking the sender.

use super::signals::{Signal, SignalNotifier, SignalSink};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Where a shutdown request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Relayed from the operating system
    Os,
    /// Requested through a [`Shutdowner`]
    Shutdowner,
}

/// Why the application was asked to shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownSignal {
    pub signal: Signal,
    /// Exit status requested by the caller, if any
    pub exit_code: Option<i32>,
    pub origin: Origin,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} (exit code {})", self.signal, code),
            None => write!(f, "{}", self.signal),
        }
    }
}

/// Options accepted by [`Shutdowner::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOption {
    /// Exit status for the process once the application has stopped
    ExitCode(i32),
    /// Signal recorded as the shutdown cause, `Terminate` by default
    Signal(Signal),
}

/// Single-winner slot holding the current run's shutdown cause
pub(crate) struct ShutdownState {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownState {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Record `signal` unless a cause is already pending
    pub(crate) fn deliver(&self, signal: ShutdownSignal) -> bool {
        let accepted = self.tx.send_if_modified(|pending| {
            if pending.is_some() {
                return false;
            }
            *pending = Some(signal);
            true
        });
        if !accepted {
            tracing::debug!("Shutdown already pending, dropping {}", signal);
        }
        accepted
    }

    pub(crate) fn pending(&self) -> Option<ShutdownSignal> {
        *self.tx.borrow()
    }

    pub(crate) fn clear(&self) {
        self.tx.send_replace(None);
    }

    fn subscribe(&self) -> watch::Receiver<Option<ShutdownSignal>> {
        self.tx.subscribe()
    }
}

/// Handle for requesting shutdown programmatically
///
/// Provided to every application, so constructors and hooks can resolve it
/// from the container. Cloning is cheap.
#[derive(Clone)]
pub struct Shutdowner {
    state: Arc<ShutdownState>,
}

impl Shutdowner {
    pub(crate) fn new(state: Arc<ShutdownState>) -> Self {
        Self { state }
    }

    /// Ask the application to stop
    ///
    /// Returns `true` if this request became the run's shutdown cause and
    /// `false` if another cause was already pending; the latter is dropped.
    pub fn shutdown(&self, options: impl IntoIterator<Item = ShutdownOption>) -> bool {
        let mut signal = ShutdownSignal {
            signal: Signal::Terminate,
            exit_code: None,
            origin: Origin::Shutdowner,
        };
        for option in options {
            match option {
                ShutdownOption::ExitCode(code) => signal.exit_code = Some(code),
                ShutdownOption::Signal(sig) => signal.signal = sig,
            }
        }
        self.state.deliver(signal)
    }
}

impl fmt::Debug for Shutdowner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdowner")
            .field("pending", &self.state.pending())
            .finish()
    }
}

/// Resolves to the shutdown cause of the current run
pub struct ShutdownWait {
    rx: watch::Receiver<Option<ShutdownSignal>>,
    // Keeps the channel open for as long as someone is waiting.
    _state: Arc<ShutdownState>,
}

impl ShutdownWait {
    pub async fn recv(mut self) -> ShutdownSignal {
        let delivered = match self.rx.wait_for(Option::is_some).await {
            Ok(pending) => *pending,
            Err(_) => None,
        };
        match delivered {
            Some(signal) => signal,
            // The sender lives in `_state`, so the channel cannot close under us.
            None => std::future::pending().await,
        }
    }

    /// The cause, if one has already been delivered
    pub fn try_recv(&self) -> Option<ShutdownSignal> {
        *self.rx.borrow()
    }
}

/// Lazily armed bridge between a [`SignalNotifier`] and the shutdown state
pub(crate) struct SignalReceivers {
    state: Arc<ShutdownState>,
    notifier: Arc<dyn SignalNotifier>,
    armed: Mutex<Option<SignalSink>>,
}

impl SignalReceivers {
    pub(crate) fn new(notifier: Arc<dyn SignalNotifier>) -> Self {
        Self {
            state: Arc::new(ShutdownState::new()),
            notifier,
            armed: Mutex::new(None),
        }
    }

    pub(crate) fn shutdowner(&self) -> Shutdowner {
        Shutdowner::new(Arc::clone(&self.state))
    }

    /// Subscribe to OS signals once; later calls are no-ops until `disarm`
    pub(crate) fn arm(&self) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if armed.is_some() {
            return;
        }
        let sink = SignalSink::new(Arc::clone(&self.state));
        tracing::debug!("Arming OS signal relay");
        self.notifier.notify(sink.clone(), &Signal::TERMINATION);
        *armed = Some(sink);
    }

    pub(crate) fn disarm(&self) {
        let sink = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sink) = sink {
            self.notifier.stop_notify(&sink);
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn wait(&self) -> ShutdownWait {
        self.arm();
        ShutdownWait {
            rx: self.state.subscribe(),
            _state: Arc::clone(&self.state),
        }
    }

    /// Forget the previous run's cause so the next run starts clean
    pub(crate) fn reset(&self) {
        self.disarm();
        self.state.clear();
    }
}
