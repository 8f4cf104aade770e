//! Event handler that keeps every event for later assertions.

use std::sync::{Arc, Mutex, MutexGuard};

use bridge_core::{AttemptFailedEvent, DispatchAbandonedEvent, DispatchEvent, EventHandler};

/// Records every [`DispatchEvent`] it receives. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventHandler {
    events: Arc<Mutex<Vec<DispatchEvent>>>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, in the order received.
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.lock().clone()
    }

    /// Event names, in the order received.
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(DispatchEvent::name).collect()
    }

    /// Number of events named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|event| event.name() == name).count()
    }

    /// Every failed-attempt event, in attempt order.
    pub fn failures(&self) -> Vec<AttemptFailedEvent> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                DispatchEvent::AttemptFailed(failed) => Some(failed.clone()),
                _ => None,
            })
            .collect()
    }

    /// The abandonment event, if one was published.
    pub fn abandoned(&self) -> Option<DispatchAbandonedEvent> {
        self.lock().iter().find_map(|event| match event {
            DispatchEvent::Abandoned(abandoned) => Some(abandoned.clone()),
            _ => None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DispatchEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        self.lock().push(event);
    }
}
