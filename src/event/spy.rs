use super::{EventLogger, LifecycleEvent};
use std::sync::{Mutex, PoisonError};

/// Event logger that records everything it receives
///
/// Intended for tests that assert on the exact event sequence of a run.
///
/// ```
/// use conductor::event::{EventLogger, LifecycleEvent, Spy};
///
/// let spy = Spy::new();
/// spy.log_event(&LifecycleEvent::Started);
/// assert_eq!(spy.event_types(), vec!["Started"]);
/// ```
#[derive(Debug, Default)]
pub struct Spy {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tags of the recorded events, in order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(LifecycleEvent::name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventLogger for Spy {
    fn log_event(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
