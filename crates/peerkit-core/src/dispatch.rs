//! Event dispatch thread.
//!
//! Drains the [`EventQueue`] and delivers events: synthetic requests are
//! served against the native layer, closures are run, and listeners see
//! every user event and every served request. Listener and closure panics
//! are contained; they never take the dispatch thread down.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use peerkit_common::{Result, ResultExt};
use tracing::{debug, error, trace};

use crate::barrier::panic_message;
use crate::event::{Event, EventListener, EventQueue};
use crate::native::NativeLayer;

/// Name of the dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "peerkit-dispatch";

/// Listener registry shared between the toolkit and the dispatch thread.
pub type Listeners = Arc<RwLock<Vec<EventListener>>>;

/// Handle on a running dispatch thread.
#[derive(Debug)]
pub struct EventDispatchThread {
    id: ThreadId,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl EventDispatchThread {
    pub fn start(
        queue: EventQueue,
        native: Arc<dyn NativeLayer>,
        listeners: Listeners,
    ) -> Result<Self> {
        let (stop, stop_rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                let dispatcher = Dispatcher {
                    native,
                    listeners,
                };
                dispatcher.run(&queue, &stop_rx);
            })
            .context("spawning event dispatch thread")?;

        let id = handle.thread().id();
        debug!(?id, "Event dispatch thread started");

        Ok(Self { id, stop, handle })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Make the thread leave its pull loop. Does not wait for it.
    ///
    /// An event already being dispatched finishes; no further event is
    /// taken from the queue by this thread.
    pub fn stop_dispatching(&self) {
        let _ = self.stop.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop and wait for the thread to exit.
    ///
    /// Must not be called from the dispatch thread itself.
    pub fn join(self) {
        self.stop_dispatching();
        let _ = self.handle.join();
    }
}

struct Dispatcher {
    native: Arc<dyn NativeLayer>,
    listeners: Listeners,
}

impl Dispatcher {
    fn run(&self, queue: &EventQueue, stop: &Receiver<()>) {
        let _consumer = queue.claim_consumer();
        let events = queue.receiver();

        while !stop_requested(stop) {
            if let Some(event) = queue.take_returned() {
                self.dispatch(event);
                continue;
            }
            // select! picks at random among ready operations, so stop is
            // checked again once an event has been taken
            select! {
                recv(stop) -> _ => break,
                recv(events) -> event => match event {
                    Ok(event) if stop_requested(stop) => {
                        queue.hand_back(event);
                        break;
                    }
                    Ok(event) => self.dispatch(event),
                    Err(_) => break,
                },
            }
        }
        debug!("Event dispatch thread stopped");
    }

    fn dispatch(&self, event: Event) {
        trace!(?event, "Dispatching");
        match event {
            Event::Wm(request) => {
                request.serve(self.native.as_ref());
                self.notify(&Event::Wm(request));
            }
            Event::Invoke(runnable) => {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(runnable)) {
                    error!(panic = %panic_message(payload.as_ref()), "Invoked closure panicked");
                }
            }
            event @ Event::User { .. } => self.notify(&event),
        }
    }

    fn notify(&self, event: &Event) {
        // Snapshot so listeners may register listeners
        let listeners: Vec<EventListener> = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        for listener in listeners {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                error!(panic = %panic_message(payload.as_ref()), "Event listener panicked");
            }
        }
    }
}

/// A stop message or a dropped handle both end the loop.
fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}
