//! Emitter handle stages use to publish events.

use miette::Diagnostic;
use thiserror::Error;

use super::event::Event;

/// Failure to publish an event.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    /// The bus receiver is gone; the run is shutting down.
    #[error("event bus closed")]
    #[diagnostic(code(delvegraph::event_bus::closed))]
    Closed,
}

/// Anything that accepts events. The bus hands out [`BusEmitter`]s; tests may
/// substitute their own implementation.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: Event) -> Result<(), EmitError>;
}

/// Cloneable handle publishing into an [`EventBus`](super::EventBus).
#[derive(Clone, Debug)]
pub struct BusEmitter {
    sender: flume::Sender<Event>,
}

impl BusEmitter {
    pub(super) fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitError> {
        self.sender.send(event).map_err(|_| EmitError::Closed)
    }
}
