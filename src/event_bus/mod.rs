//! Structured observability for workflow runs.
//!
//! The engine and its stages publish [`Event`]s onto an in-process
//! [`EventBus`]; a background listener broadcasts them to pluggable
//! [`EventSink`]s. Loop transitions (revision controller, bounded search)
//! always emit here with their counter and decision, so the termination
//! behavior of every run can be audited from the event record alone.
//!
//! # Example
//!
//! ```
//! use delvegraph::event_bus::{Event, EventBus, MemorySink};
//! use delvegraph::event_bus::EventEmitter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = MemorySink::new();
//! let bus = EventBus::new().with_sink(sink.clone());
//! bus.start_listener();
//!
//! bus.get_emitter()
//!     .emit(Event::loop_transition("revision", 0, Some(1), "revise"))
//!     .unwrap();
//! bus.stop_listener().await;
//!
//! assert_eq!(sink.len(), 1);
//! # }
//! ```

mod bus;
mod emitter;
mod event;
mod sink;

pub use bus::EventBus;
pub use emitter::{BusEmitter, EmitError, EventEmitter};
pub use event::{DiagnosticEvent, Event, LoopEvent, RouteEvent, RUN_END_SCOPE, StageEvent};
pub use sink::{EventSink, MemorySink, StdOutSink};
