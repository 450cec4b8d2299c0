//! The bus itself: an unbounded channel fanned out to registered sinks by a
//! background listener task.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::emitter::BusEmitter;
use super::event::Event;
use super::sink::EventSink;

struct ListenerState {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// In-process event bus.
///
/// Producers publish through [`BusEmitter`] handles; a listener task (started
/// by the runner, or manually via [`start_listener`](Self::start_listener))
/// broadcasts each event to every registered [`EventSink`]. Alternatively a
/// consumer may claim the raw stream once with
/// [`take_stream`](Self::take_stream); streams and the listener would compete
/// for the same events, so a claimed stream keeps the listener off.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
    listener: Mutex<Option<ListenerState>>,
    stream_taken: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sinks: Arc::new(Mutex::new(Vec::new())),
            sender,
            receiver,
            listener: Mutex::new(None),
            stream_taken: AtomicBool::new(false),
        }
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style sink registration.
    #[must_use]
    pub fn with_sink(self, sink: impl EventSink + 'static) -> Self {
        self.sinks.lock().push(Box::new(sink));
        self
    }

    pub fn add_sink(&self, sink: impl EventSink + 'static) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Raw sender, for plumbing that bypasses the emitter trait.
    #[must_use]
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.sender.clone()
    }

    /// Handle stages publish through.
    #[must_use]
    pub fn get_emitter(&self) -> BusEmitter {
        BusEmitter::new(self.sender.clone())
    }

    /// Claims the raw event stream. Returns `None` after the first call.
    #[must_use]
    pub fn take_stream(&self) -> Option<flume::r#async::RecvStream<'static, Event>> {
        if self.stream_taken.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.receiver.clone().into_stream())
    }

    /// Starts the broadcast listener if it is not already running.
    ///
    /// The listener drains the channel and hands each event to every sink.
    /// With no sinks registered it still drains, keeping the unbounded
    /// channel from accumulating. Once the raw stream has been claimed the
    /// listener stays off: the stream owner is the sole consumer.
    pub fn start_listener(&self) {
        if self.stream_taken.load(Ordering::SeqCst) {
            return;
        }
        let mut guard = self.listener.lock();
        if guard.is_some() {
            return;
        }
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let receiver = self.receiver.clone();
        let sinks = Arc::clone(&self.sinks);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        while let Ok(event) = receiver.try_recv() {
                            broadcast(&sinks, &event);
                        }
                        break;
                    }
                    received = receiver.recv_async() => match received {
                        Ok(event) => broadcast(&sinks, &event),
                        Err(_) => break,
                    }
                }
            }
        });
        *guard = Some(ListenerState { shutdown, handle });
    }

    /// Stops the listener after it has drained pending events.
    pub async fn stop_listener(&self) {
        let state = self.listener.lock().take();
        if let Some(ListenerState { shutdown, handle }) = state {
            let _ = shutdown.send(());
            let _ = handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(state) = self.listener.lock().take() {
            state.handle.abort();
        }
    }
}

fn broadcast(sinks: &Mutex<Vec<Box<dyn EventSink>>>, event: &Event) {
    for sink in sinks.lock().iter() {
        sink.on_event(event);
    }
}
