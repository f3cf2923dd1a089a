//! OS signal subscription
//!
//! Subscribing is deferred until an application is actually waited on, so a
//! library embedding an application never has its host's signal handling
//! replaced behind its back.

use super::shutdown::{Origin, ShutdownSignal, ShutdownState};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

/// A process signal that can request shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Any other signal number
    Other(i32),
}

impl Signal {
    /// Signals an armed application listens for
    pub const TERMINATION: [Signal; 2] = [Signal::Interrupt, Signal::Terminate];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("interrupt"),
            Signal::Terminate => f.write_str("terminated"),
            Signal::Other(n) => write!(f, "signal {}", n),
        }
    }
}

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Destination a [`SignalNotifier`] relays signals into
///
/// Sending never blocks; if a shutdown cause is already pending the signal is
/// dropped.
#[derive(Clone)]
pub struct SignalSink {
    id: u64,
    state: Arc<ShutdownState>,
}

impl SignalSink {
    pub(crate) fn new(state: Arc<ShutdownState>) -> Self {
        Self {
            id: NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed),
            state,
        }
    }

    /// Identity used to match `stop_notify` with the earlier `notify`
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver an OS signal; `true` if it became the shutdown cause
    pub fn send(&self, signal: Signal) -> bool {
        self.state.deliver(ShutdownSignal {
            signal,
            exit_code: None,
            origin: Origin::Os,
        })
    }
}

impl fmt::Debug for SignalSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSink").field("id", &self.id).finish()
    }
}

/// Subscription surface for OS signals
///
/// The default implementation is [`OsSignals`]; tests inject their own to
/// observe when an application arms itself and to simulate signals.
pub trait SignalNotifier: Send + Sync {
    /// Start relaying `signals` into `sink`
    fn notify(&self, sink: SignalSink, signals: &[Signal]);

    /// Stop relaying into `sink`
    fn stop_notify(&self, sink: &SignalSink);
}

/// Relays real process signals using tokio's signal streams
///
/// The handlers are installed before `notify` returns, so a signal raised
/// right after an application reports itself armed is already caught. Each
/// subscription then runs on a tokio task; `notify` outside a runtime logs a
/// warning and relays nothing.
///
/// `stop_notify` ends the relay, but tokio keeps its process-wide handler for
/// a signal once installed. After the first subscription SIGINT/SIGTERM no
/// longer terminate the process by default, even once every application has
/// stopped; a host that needs that behaviour back has to restore it itself.
#[derive(Default)]
pub struct OsSignals {
    relays: DashMap<u64, JoinHandle<()>>,
}

impl OsSignals {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalNotifier for OsSignals {
    fn notify(&self, sink: SignalSink, signals: &[Signal]) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("No tokio runtime, OS signals will not trigger shutdown: {}", e);
                return;
            }
        };
        let streams = {
            let _runtime = handle.enter();
            install(signals)
        };
        if streams.is_empty() {
            return;
        }
        let id = sink.id();
        let task = handle.spawn(relay(sink, streams));
        if let Some(previous) = self.relays.insert(id, task) {
            previous.abort();
        }
    }

    fn stop_notify(&self, sink: &SignalSink) {
        if let Some((_, task)) = self.relays.remove(&sink.id()) {
            task.abort();
        }
    }
}

#[cfg(unix)]
type Stream = tokio::signal::unix::Signal;

#[cfg(windows)]
type Stream = tokio::signal::windows::CtrlC;

#[cfg(unix)]
fn install(signals: &[Signal]) -> Vec<(Signal, Stream)> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut streams = Vec::with_capacity(signals.len());
    for &sig in signals {
        let kind = match sig {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Other(n) => SignalKind::from_raw(n),
        };
        match signal(kind) {
            Ok(stream) => streams.push((sig, stream)),
            Err(e) => tracing::error!("Failed to install {} handler: {}", sig, e),
        }
    }
    streams
}

#[cfg(windows)]
fn install(signals: &[Signal]) -> Vec<(Signal, Stream)> {
    if !signals.contains(&Signal::Interrupt) {
        return Vec::new();
    }
    match tokio::signal::windows::ctrl_c() {
        Ok(stream) => vec![(Signal::Interrupt, stream)],
        Err(e) => {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            Vec::new()
        }
    }
}

async fn relay(sink: SignalSink, mut streams: Vec<(Signal, Stream)>) {
    use futures::future::{FutureExt, select_all};

    loop {
        let received = {
            let waiting = streams.iter_mut().map(|(sig, stream)| {
                let sig = *sig;
                async move { stream.recv().await.map(|_| sig) }.boxed()
            });
            select_all(waiting).await.0
        };
        match received {
            Some(sig) => {
                tracing::info!("Received {} signal", sig);
                sink.send(sig);
            }
            None => return,
        }
    }
}
