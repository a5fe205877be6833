//! Native init barrier.
//!
//! Nothing that depends on the native layer (screen geometry, the event
//! queue, window creation) may run before native init has succeeded. The
//! barrier enforces that: the starting thread blocks in [`InitBarrier::wait`]
//! until a [`ReadySignal`] publishes a fully built [`ToolkitState`], or
//! until startup is declared failed.
//!
//! On takeover backends the signal fires from inside the native init call,
//! on the collector thread, right before the backend enters its permanent
//! dispatcher loop. Waiting on the call's return would never finish.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use peerkit_common::{PeerKitError, Result};
use tracing::{debug, info, warn};

use crate::event::EventQueue;
use crate::native::{Dimension, NativeLayer};

/// State that only exists once the native layer is up.
#[derive(Debug)]
pub struct ToolkitState {
    screen_size: Dimension,
    resolution: u32,
    event_queue: EventQueue,
    ready_thread: ThreadId,
}

impl ToolkitState {
    pub fn screen_size(&self) -> Dimension {
        self.screen_size
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn event_queue(&self) -> &EventQueue {
        &self.event_queue
    }

    /// Thread that published readiness.
    pub fn ready_thread(&self) -> ThreadId {
        self.ready_thread
    }
}

enum Phase {
    Pending,
    Ready(Arc<ToolkitState>),
    Failed(String),
}

/// One-shot monitor the starting thread blocks on.
pub(crate) struct InitBarrier {
    phase: Mutex<Phase>,
    changed: Condvar,
}

impl InitBarrier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(Phase::Pending),
            changed: Condvar::new(),
        })
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn is_pending(&self) -> bool {
        matches!(*self.phase(), Phase::Pending)
    }

    fn publish(&self, state: Arc<ToolkitState>) -> bool {
        let mut phase = self.phase();
        if !matches!(*phase, Phase::Pending) {
            return false;
        }
        *phase = Phase::Ready(state);
        drop(phase);
        self.changed.notify_all();
        true
    }

    fn fail(&self, reason: String) -> bool {
        let mut phase = self.phase();
        if !matches!(*phase, Phase::Pending) {
            return false;
        }
        *phase = Phase::Failed(reason);
        drop(phase);
        self.changed.notify_all();
        true
    }

    /// Block until startup has either succeeded or failed.
    pub(crate) fn wait(&self) -> Result<Arc<ToolkitState>> {
        let phase = self
            .changed
            .wait_while(self.phase(), |phase| matches!(phase, Phase::Pending))
            .unwrap_or_else(|p| p.into_inner());

        match &*phase {
            Phase::Ready(state) => Ok(state.clone()),
            Phase::Failed(reason) => Err(PeerKitError::fatal_init(reason.clone())),
            Phase::Pending => Err(PeerKitError::internal("init barrier released while pending")),
        }
    }
}

/// Handed to [`NativeLayer::init`]; the backend fires it once its internal
/// setup is done.
///
/// Firing runs the secondary init (screen geometry, resolution, event
/// queue) on the calling thread and releases the starting thread. Only the
/// first signal counts.
#[derive(Clone)]
pub struct ReadySignal {
    barrier: Arc<InitBarrier>,
    native: Arc<dyn NativeLayer>,
}

impl ReadySignal {
    pub(crate) fn new(barrier: Arc<InitBarrier>, native: Arc<dyn NativeLayer>) -> Self {
        Self { barrier, native }
    }

    /// Publish readiness. Later calls are ignored.
    pub fn signal(&self) {
        if !self.barrier.is_pending() {
            debug!("Readiness already settled, ignoring signal");
            return;
        }

        let state = Arc::new(ToolkitState {
            screen_size: self.native.screen_size(),
            resolution: self.native.resolution(),
            event_queue: EventQueue::new(),
            ready_thread: thread::current().id(),
        });

        if self.barrier.publish(state.clone()) {
            info!(
                screen = ?state.screen_size,
                resolution = state.resolution,
                thread = ?thread::current().name(),
                "Native layer ready"
            );
        }
    }

    /// Whether readiness has been published.
    pub fn is_signalled(&self) -> bool {
        matches!(*self.barrier.phase(), Phase::Ready(_))
    }

    /// Declare startup failed. The barrier ignores this once readiness was
    /// published; the caller decides whether the failure still aborts startup.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let settled = self.barrier.fail(reason.clone());
        if !settled {
            warn!(%reason, "Native failure reported after readiness was published");
        }
        settled
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("signalled", &self.is_signalled())
            .finish()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
