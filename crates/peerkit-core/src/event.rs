//! Events, synthetic window-manager requests and the event queue.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, trace};

use crate::native::{NativeHandle, NativeLayer};
use crate::window::Window;

/// What a synthetic request asks the owning thread to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmKind {
    Create,
    Destroy,
}

impl WmKind {
    /// Whether the target's handle slot shows this request as served.
    pub fn is_complete(self, handle: &Option<NativeHandle>) -> bool {
        match self {
            WmKind::Create => handle.is_some(),
            WmKind::Destroy => handle.is_none(),
        }
    }
}

/// A cross-thread window-manager request.
///
/// Created by the requesting thread, served by the thread that owns native
/// dispatch. The event doubles as the synchronization token: the requester
/// waits on its condvar, the server notifies it once the target's handle
/// has been written.
pub struct WmEvent {
    kind: WmKind,
    target: Arc<Window>,
    signal: Condvar,
}

impl WmEvent {
    pub(crate) fn new(kind: WmKind, target: Arc<Window>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            target,
            signal: Condvar::new(),
        })
    }

    pub fn kind(&self) -> WmKind {
        self.kind
    }

    pub fn target(&self) -> &Arc<Window> {
        &self.target
    }

    pub fn is_complete(&self) -> bool {
        self.kind.is_complete(&self.target.native_handle())
    }

    /// Perform the native side of the request and wake the requester.
    ///
    /// Must run on the thread owning native dispatch. A failed creation is
    /// logged and leaves the target unrealized; the requester keeps
    /// waiting (or times out, if it bounded its wait).
    pub fn serve(&self, native: &dyn NativeLayer) {
        let window_id = self.target.id();
        let _realizing = self.target.realize_guard();

        match self.kind {
            WmKind::Create => {
                if self.target.is_realized() {
                    trace!(?window_id, "Create request for realized window");
                    self.signal.notify_all();
                    return;
                }
                match native.create_window(self.target.spec()) {
                    Ok(handle) => {
                        debug!(?window_id, ?handle, "Window created on owner thread");
                        self.target.set_native(Some(handle), &self.signal);
                    }
                    Err(e) => {
                        error!(?window_id, error = %e, "Native window creation failed");
                    }
                }
            }
            WmKind::Destroy => {
                if let Some(handle) = self.target.native_handle() {
                    native.destroy_window(handle);
                    debug!(?window_id, ?handle, "Window destroyed on owner thread");
                }
                self.target.set_native(None, &self.signal);
            }
        }
    }

    /// Block until served. Returns `false` on timeout.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let kind = self.kind;
        self.target
            .wait_until(&self.signal, timeout, move |handle| kind.is_complete(handle))
    }
}

impl fmt::Debug for WmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WmEvent")
            .field("kind", &self.kind)
            .field("target", &self.target.id())
            .finish()
    }
}

/// Work scheduled on the dispatch thread.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Anything that travels through the event queue.
pub enum Event {
    /// Synthetic window-manager request.
    Wm(Arc<WmEvent>),
    /// Closure to run on the dispatch thread.
    Invoke(Runnable),
    /// Application event, delivered to listeners.
    User { id: u32, payload: String },
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Wm(wm) => f.debug_tuple("Wm").field(wm).finish(),
            Event::Invoke(_) => f.write_str("Invoke(..)"),
            Event::User { id, payload } => f
                .debug_struct("User")
                .field("id", id)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// Listener for dispatched events.
pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Thread-safe FIFO between event producers and the dispatch thread.
///
/// Cloning yields another handle on the same queue. At most one dispatch
/// thread consumes it at a time.
#[derive(Clone)]
pub struct EventQueue {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    /// Event taken by a stopping consumer; it goes out before the channel.
    returned: Arc<Mutex<Option<Event>>>,
    consumer: Arc<Mutex<()>>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            returned: Arc::new(Mutex::new(None)),
            consumer: Arc::new(Mutex::new(())),
        }
    }

    /// Append an event. Never blocks.
    pub fn post_event(&self, event: Event) {
        trace!(?event, "Event posted");
        // Cannot fail: this queue keeps its own receiver alive.
        let _ = self.sender.send(event);
    }

    /// Number of events waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.receiver.len() + usize::from(self.returned().is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Take the next event without blocking.
    pub fn try_next(&self) -> Option<Event> {
        self.take_returned().or_else(|| self.receiver.try_recv().ok())
    }

    pub(crate) fn receiver(&self) -> &Receiver<Event> {
        &self.receiver
    }

    /// Become the only consumer until the guard drops.
    ///
    /// A dispatch thread started while an older one is still finishing its
    /// last event blocks here until that one exits.
    pub(crate) fn claim_consumer(&self) -> MutexGuard<'_, ()> {
        self.consumer.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Put back an event that was received but not dispatched.
    pub(crate) fn hand_back(&self, event: Event) {
        trace!(?event, "Event handed back");
        *self.returned() = Some(event);
    }

    pub(crate) fn take_returned(&self) -> Option<Event> {
        self.returned().take()
    }

    fn returned(&self) -> MutexGuard<'_, Option<Event>> {
        self.returned.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
