//! Lifecycle controller.
//!
//! Owns the optional dispatch and flush workers. Transitions are serialized
//! by one mutex; nothing else in the toolkit takes it, so a stop requested
//! from the dispatch thread itself cannot deadlock.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::ThreadId;
use std::time::Duration;

use peerkit_common::{PeerKitError, Result};
use tracing::{debug, info};

use crate::dispatch::{EventDispatchThread, Listeners};
use crate::event::{EventListener, EventQueue};
use crate::flush::FlushThread;
use crate::native::NativeLayer;

#[derive(Debug, Default)]
struct Workers {
    dispatch: Option<EventDispatchThread>,
    flush: Option<FlushThread>,
    /// Set by shutdown; no worker starts afterwards.
    closed: bool,
}

/// Starts and stops the dispatch and flush threads together.
pub struct LifecycleController {
    native: Arc<dyn NativeLayer>,
    queue: EventQueue,
    listeners: Listeners,
    needs_flush: bool,
    flush_interval: Duration,
    workers: Mutex<Workers>,
}

impl LifecycleController {
    pub fn new(
        native: Arc<dyn NativeLayer>,
        queue: EventQueue,
        needs_flush: bool,
        flush_interval: Duration,
    ) -> Self {
        Self {
            native,
            queue,
            listeners: Arc::new(RwLock::new(Vec::new())),
            needs_flush,
            flush_interval,
            workers: Mutex::new(Workers::default()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Ensure the dispatch thread runs, plus the flush thread when the
    /// backend needs one. Returns `true` if a dispatch thread was started.
    ///
    /// Fails with [`PeerKitError::Terminated`] after [`shutdown`](Self::shutdown).
    pub fn start_dispatch(&self) -> Result<bool> {
        let mut workers = self.workers();
        if workers.closed {
            return Err(PeerKitError::Terminated);
        }
        if workers.dispatch.is_some() {
            return Ok(false);
        }

        workers.dispatch = Some(EventDispatchThread::start(
            self.queue.clone(),
            self.native.clone(),
            self.listeners.clone(),
        )?);

        if self.needs_flush && workers.flush.is_none() {
            workers.flush = Some(FlushThread::start(self.native.clone(), self.flush_interval)?);
        }

        info!(flushing = workers.flush.is_some(), "Dispatch started");
        Ok(true)
    }

    /// Stop flushing, then dispatching. Returns `false` when nothing ran.
    ///
    /// Workers are told to stop and released; they are not joined, so this
    /// is safe to call from the dispatch thread.
    pub fn stop_dispatch(&self) -> bool {
        let workers = self.workers();
        Self::stop_workers(workers)
    }

    /// Stop both workers for good. Later starts fail.
    pub fn shutdown(&self) -> bool {
        let mut workers = self.workers();
        workers.closed = true;
        Self::stop_workers(workers)
    }

    fn stop_workers(mut workers: MutexGuard<'_, Workers>) -> bool {
        let flush = workers.flush.take();
        let dispatch = workers.dispatch.take();
        drop(workers);

        if flush.is_none() && dispatch.is_none() {
            return false;
        }
        if let Some(flush) = flush {
            flush.stop_flushing();
        }
        if let Some(dispatch) = dispatch {
            dispatch.stop_dispatching();
        }

        debug!("Dispatch stopped");
        true
    }

    pub fn is_dispatching(&self) -> bool {
        self.workers().dispatch.is_some()
    }

    pub fn is_flushing(&self) -> bool {
        self.workers().flush.is_some()
    }

    pub fn dispatch_thread_id(&self) -> Option<ThreadId> {
        self.workers().dispatch.as_ref().map(EventDispatchThread::id)
    }

    /// Flush attempts made by the current flush thread.
    pub fn flush_ticks(&self) -> Option<u64> {
        self.workers().flush.as_ref().map(FlushThread::ticks)
    }

    pub fn add_listener(&self, listener: EventListener) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("needs_flush", &self.needs_flush)
            .field("flush_interval", &self.flush_interval)
            .field("workers", &*self.workers())
            .finish()
    }
}
