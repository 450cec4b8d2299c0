//! Event sinks: where broadcast events land.

use parking_lot::Mutex;
use std::sync::Arc;

use super::event::Event;

/// Receives every event the bus listener broadcasts.
///
/// Sinks run on the listener task and should return quickly; anything slow
/// belongs behind its own channel.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Prints each event's [`Display`](std::fmt::Display) form to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn on_event(&self, event: &Event) {
        println!("{event}");
    }
}

/// Collects events in memory. Clones share the same buffer, so tests keep one
/// clone and hand the other to the bus.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Drains and returns the captured events.
    #[must_use]
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
