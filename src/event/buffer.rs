use super::{EventLogger, LifecycleEvent};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Default)]
struct State {
    pending: Vec<LifecycleEvent>,
    sink: Option<Arc<dyn EventLogger>>,
}

/// Holds events until the real logger exists, then forwards to it
///
/// The container is populated before the user's logger can be constructed, so
/// `Provided` events are queued here and replayed in order on [`connect`].
///
/// [`connect`]: BufferedLogger::connect
#[derive(Default)]
pub(crate) struct BufferedLogger {
    state: Mutex<State>,
}

impl BufferedLogger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Route all future events to `sink`, flushing queued ones first
    ///
    /// Neither replay nor forwarding holds the buffer's lock, so a sink may
    /// log back into the buffer; such events queue behind the replay.
    pub(crate) fn connect(&self, sink: Arc<dyn EventLogger>) {
        loop {
            let batch = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.pending.is_empty() {
                    state.sink = Some(sink);
                    return;
                }
                std::mem::take(&mut state.pending)
            };
            for event in &batch {
                sink.log_event(event);
            }
        }
    }
}

impl EventLogger for BufferedLogger {
    fn log_event(&self, event: &LifecycleEvent) {
        let sink = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &state.sink {
                Some(sink) => Arc::clone(sink),
                None => {
                    state.pending.push(event.clone());
                    return;
                }
            }
        };
        sink.log_event(event);
    }
}
