//! Create-thread rendezvous.
//!
//! Thread-affine window requests are forced onto the thread that owns
//! native dispatch. The requesting thread wraps the request in a
//! [`WmEvent`], routes it to the owner and blocks until the owner has
//! written the target's native handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use peerkit_common::{PeerKitError, Result};
use tracing::{debug, warn};

use crate::capabilities::DispatchOwner;
use crate::event::{Event, EventQueue, WmEvent, WmKind};
use crate::native::NativeLayer;
use crate::window::Window;

/// Where a thread-affine request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run the native call on the calling thread.
    Direct,
    /// Hand the request to the native loop on the collector thread.
    InjectNative,
    /// Post the request to the event queue for the dispatch thread.
    PostToQueue,
}

/// Decide how a request issued on `current` reaches the owning thread.
pub fn route(
    owner: DispatchOwner,
    current: ThreadId,
    collector: Option<ThreadId>,
    dispatcher: Option<ThreadId>,
) -> Route {
    match owner {
        DispatchOwner::Unrestricted => Route::Direct,
        DispatchOwner::Collector => match collector {
            Some(id) if id != current => Route::InjectNative,
            _ => Route::Direct,
        },
        DispatchOwner::EventThread => {
            if dispatcher == Some(current) {
                Route::Direct
            } else {
                Route::PostToQueue
            }
        }
    }
}

/// Counters of rendezvous activity.
#[derive(Debug, Default)]
pub struct RendezvousStats {
    synthetic_events: AtomicU64,
    injected: AtomicU64,
    posted: AtomicU64,
}

/// Point-in-time copy of [`RendezvousStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendezvousSnapshot {
    /// Synthetic requests created.
    pub synthetic_events: u64,
    /// Requests handed to the native loop.
    pub injected: u64,
    /// Requests posted to the event queue.
    pub posted: u64,
}

impl RendezvousStats {
    pub fn snapshot(&self) -> RendezvousSnapshot {
        RendezvousSnapshot {
            synthetic_events: self.synthetic_events.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
            posted: self.posted.load(Ordering::Relaxed),
        }
    }
}

/// Hands requests to the owner thread and waits for completion.
#[derive(Debug)]
pub struct Rendezvous {
    stats: RendezvousStats,
    timeout: Option<Duration>,
}

impl Rendezvous {
    /// `timeout` of `None` waits for as long as it takes.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            stats: RendezvousStats::default(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn stats(&self) -> RendezvousSnapshot {
        self.stats.snapshot()
    }

    /// Run one request through `route`.
    ///
    /// Returns `Ok(false)` for [`Route::Direct`] without creating an event.
    /// Otherwise exactly one [`WmEvent`] is created and delivered, and the
    /// call returns `Ok(true)` once the owner completed it.
    pub fn hand_off(
        &self,
        route: Route,
        kind: WmKind,
        window: &Arc<Window>,
        native: &dyn NativeLayer,
        queue: &EventQueue,
    ) -> Result<bool> {
        let request = match route {
            Route::Direct => return Ok(false),
            Route::InjectNative | Route::PostToQueue => WmEvent::new(kind, window.clone()),
        };
        self.stats.synthetic_events.fetch_add(1, Ordering::Relaxed);
        debug!(window_id = ?window.id(), ?kind, ?route, "Handing request to owner thread");

        if route == Route::InjectNative {
            self.stats.injected.fetch_add(1, Ordering::Relaxed);
            native.send_wm_event(request.clone());
        } else {
            self.stats.posted.fetch_add(1, Ordering::Relaxed);
            queue.post_event(Event::Wm(request.clone()));
        }

        if request.wait(self.timeout) {
            Ok(true)
        } else {
            // Only reachable with a bounded wait
            let timeout = self.timeout.unwrap_or_default();
            warn!(window_id = ?window.id(), ?kind, ?timeout, "Owner thread did not complete request");
            Err(PeerKitError::Timeout(timeout))
        }
    }
}
