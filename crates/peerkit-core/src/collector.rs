//! Native collector thread.
//!
//! Hosts native init for backends whose init call turns into a dispatcher
//! loop that never hands control back. The thread is started once and
//! never joined; it is abandoned at process exit.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use peerkit_common::{Result, ResultExt};
use tracing::{debug, error};

use crate::barrier::{panic_message, ReadySignal};
use crate::native::NativeLayer;

/// Name of the collector thread.
pub const COLLECTOR_THREAD_NAME: &str = "peerkit-native";

/// Record of the running collector.
#[derive(Debug)]
pub struct CollectorThread {
    id: ThreadId,
    // Kept so the thread is not detached implicitly; never joined.
    _handle: JoinHandle<()>,
}

impl CollectorThread {
    /// Spawn the collector and run native init on it.
    ///
    /// Failures before readiness are reported through `ready` and surface at
    /// the init barrier. Failures after readiness are only logged.
    pub fn spawn(
        native: Arc<dyn NativeLayer>,
        display: Option<String>,
        ready: ReadySignal,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(COLLECTOR_THREAD_NAME.to_string())
            .spawn(move || run(native, display, ready))
            .context("spawning native collector thread")?;

        let id = handle.thread().id();
        debug!(?id, "Native collector started");

        Ok(Self {
            id,
            _handle: handle,
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }
}

fn run(native: Arc<dyn NativeLayer>, display: Option<String>, ready: ReadySignal) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        native.init(display.as_deref(), ready.clone())
    }));

    match outcome {
        Ok(Ok(())) if ready.is_signalled() => {
            debug!("Native dispatcher loop exited");
        }
        Ok(Ok(())) => {
            error!("Native init returned without signalling readiness");
            ready.fail("native layer init returned without signalling readiness");
        }
        Ok(Err(e)) => {
            error!(error = %e, "Native layer init failed on collector");
            ready.fail(format!("native layer init failed: {}", e));
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Native collector panicked");
            ready.fail(format!("native collector panicked: {}", message));
        }
    }
}
