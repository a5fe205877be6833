//! The toolkit: startup, thread-affine window requests and teardown.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use peerkit_common::{PeerKitError, Result, ToolkitConfig};
use tracing::{debug, error, info, warn};

use crate::barrier::{panic_message, InitBarrier, ReadySignal, ToolkitState};
use crate::capabilities::{CapabilityFlags, DispatchOwner, StartupPath};
use crate::clipboard::NativeClipboard;
use crate::collector::CollectorThread;
use crate::event::{Event, EventListener, EventQueue, WmKind};
use crate::lifecycle::LifecycleController;
use crate::native::{Dimension, NativeLayer};
use crate::rendezvous::{route, Rendezvous, RendezvousSnapshot};
use crate::window::Window;

/// A running native bridge.
pub struct Toolkit {
    native: Arc<dyn NativeLayer>,
    flags: CapabilityFlags,
    config: ToolkitConfig,
    state: Arc<ToolkitState>,
    collector: Option<CollectorThread>,
    lifecycle: LifecycleController,
    rendezvous: Rendezvous,
    clipboard: Mutex<Option<Arc<NativeClipboard>>>,
    terminated: AtomicBool,
}

impl Toolkit {
    /// Bring the native layer up and build the toolkit.
    ///
    /// Returns once the native layer has signalled readiness. Any failure
    /// before that point is a [`PeerKitError::FatalInit`]; nothing is
    /// retried.
    pub fn start(native: Arc<dyn NativeLayer>, config: ToolkitConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let flags = CapabilityFlags::from_native(native.properties()).map_err(|e| {
            error!(error = %e, "Native capability query failed");
            e
        })?;
        let path = flags.startup_path();
        debug!(?flags, ?path, "Starting native layer");

        let barrier = InitBarrier::new();
        let ready = ReadySignal::new(barrier.clone(), native.clone());

        let collector = match path {
            StartupPath::Synchronous => {
                init_in_place(native.as_ref(), config.display.as_deref(), &ready)?;
                None
            }
            StartupPath::Takeover => Some(CollectorThread::spawn(
                native.clone(),
                config.display.clone(),
                ready,
            )?),
        };

        let state = barrier.wait()?;

        let lifecycle = LifecycleController::new(
            native.clone(),
            state.event_queue().clone(),
            flags.needs_flush(),
            config.flush_interval(),
        );

        info!(
            ?path,
            owner = flags.dispatch_owner().as_str(),
            needs_flush = flags.needs_flush(),
            screen = ?state.screen_size(),
            "Toolkit started"
        );

        Ok(Arc::new(Self {
            native,
            flags,
            rendezvous: Rendezvous::new(config.create_timeout()),
            config,
            state,
            collector,
            lifecycle,
            clipboard: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }))
    }

    pub fn flags(&self) -> CapabilityFlags {
        self.flags
    }

    pub fn startup_path(&self) -> StartupPath {
        self.flags.startup_path()
    }

    pub fn dispatch_owner(&self) -> DispatchOwner {
        self.flags.dispatch_owner()
    }

    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    pub fn screen_size(&self) -> Dimension {
        self.state.screen_size()
    }

    pub fn resolution(&self) -> u32 {
        self.state.resolution()
    }

    pub fn event_queue(&self) -> &EventQueue {
        self.state.event_queue()
    }

    /// Thread that published native readiness.
    pub fn ready_thread(&self) -> ThreadId {
        self.state.ready_thread()
    }

    pub fn collector_thread(&self) -> Option<ThreadId> {
        self.collector.as_ref().map(CollectorThread::id)
    }

    pub fn dispatch_thread(&self) -> Option<ThreadId> {
        self.lifecycle.dispatch_thread_id()
    }

    pub fn is_dispatching(&self) -> bool {
        self.lifecycle.is_dispatching()
    }

    pub fn is_flushing(&self) -> bool {
        self.lifecycle.is_flushing()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn rendezvous_stats(&self) -> RendezvousSnapshot {
        self.rendezvous.stats()
    }

    /// Start the dispatch thread (and the flush thread, if needed).
    /// Returns `false` if dispatch was already running.
    pub fn start_dispatch(&self) -> Result<bool> {
        self.ensure_live()?;
        self.lifecycle.start_dispatch()
    }

    /// Stop flushing and dispatching. Returns `false` if nothing ran.
    pub fn stop_dispatch(&self) -> bool {
        self.lifecycle.stop_dispatch()
    }

    /// Move a thread-affine request onto the owning thread if needed.
    ///
    /// Starts dispatch lazily. Returns `true` when the request was handed
    /// to another thread and has completed there, `false` when the caller
    /// has to perform the native call itself.
    pub fn switch_to_owner_thread(&self, window: &Arc<Window>, kind: WmKind) -> Result<bool> {
        self.ensure_live()?;
        if !self.lifecycle.is_dispatching() {
            self.lifecycle.start_dispatch()?;
        }

        let route = route(
            self.dispatch_owner(),
            thread::current().id(),
            self.collector_thread(),
            self.lifecycle.dispatch_thread_id(),
        );

        self.rendezvous
            .hand_off(route, kind, window, self.native.as_ref(), self.event_queue())
    }

    /// Realize `window` natively.
    ///
    /// Returns once the handle is set, with `true` if creation ran on
    /// another thread. Creating a realized window is a no-op.
    pub fn create_window(&self, window: &Arc<Window>) -> Result<bool> {
        self.ensure_live()?;
        if window.is_realized() {
            return Ok(false);
        }

        if self.switch_to_owner_thread(window, WmKind::Create)? {
            return Ok(true);
        }

        let _realizing = window.realize_guard();
        if window.is_realized() {
            return Ok(false);
        }
        let handle = self.native.create_window(window.spec())?;
        window.store_native(Some(handle));
        debug!(window_id = ?window.id(), ?handle, "Window created on calling thread");
        Ok(false)
    }

    /// Release the native side of `window`.
    ///
    /// Destroying a window that was never created is a no-op.
    pub fn destroy_window(&self, window: &Arc<Window>) -> Result<bool> {
        self.ensure_live()?;
        if !window.is_realized() {
            return Ok(false);
        }

        if self.switch_to_owner_thread(window, WmKind::Destroy)? {
            return Ok(true);
        }

        let _realizing = window.realize_guard();
        if let Some(handle) = window.native_handle() {
            self.native.destroy_window(handle);
            window.store_native(None);
            debug!(window_id = ?window.id(), ?handle, "Window destroyed on calling thread");
        }
        Ok(false)
    }

    pub fn post_event(&self, event: Event) -> Result<()> {
        self.ensure_live()?;
        self.event_queue().post_event(event);
        Ok(())
    }

    /// Run `f` on the dispatch thread, starting dispatch if needed.
    pub fn invoke_later<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_live()?;
        self.lifecycle.start_dispatch()?;
        self.event_queue().post_event(Event::Invoke(Box::new(f)));
        Ok(())
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: EventListener = Arc::new(listener);
        self.lifecycle.add_listener(listener);
    }

    /// The system clipboard, created on first use.
    pub fn system_clipboard(&self) -> Result<Arc<NativeClipboard>> {
        let mut slot = self.clipboard.lock().unwrap_or_else(|p| p.into_inner());
        // Checked under the slot lock so terminate cannot miss a new clipboard
        self.ensure_live()?;
        if let Some(clipboard) = slot.as_ref() {
            return Ok(clipboard.clone());
        }
        let clipboard = Arc::new(NativeClipboard::new(self.native.clone())?);
        *slot = Some(clipboard.clone());
        Ok(clipboard)
    }

    pub fn beep(&self) {
        self.native.beep();
    }

    pub fn sync(&self) {
        self.native.sync();
    }

    /// Tear everything down: flush and dispatch threads, the clipboard,
    /// then the native layer. Later calls do nothing.
    ///
    /// Threads blocked in a hand-off are not woken.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            debug!("Toolkit already terminated");
            return;
        }

        self.lifecycle.shutdown();

        let clipboard = self
            .clipboard
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(clipboard) = clipboard {
            clipboard.dispose();
        }

        self.native.terminate();
        info!("Toolkit terminated");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_terminated() {
            Err(PeerKitError::Terminated)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("flags", &self.flags)
            .field("state", &self.state)
            .field("collector", &self.collector)
            .field("lifecycle", &self.lifecycle)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Run native init on the calling thread.
fn init_in_place(native: &dyn NativeLayer, display: Option<&str>, ready: &ReadySignal) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| native.init(display, ready.clone()))) {
        Ok(Ok(())) => {
            // No-op if the backend already signalled from inside init
            ready.signal();
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Native layer init failed");
            ready.fail(e.to_string());
            Err(PeerKitError::fatal_init_with_source("native layer initialization failed", e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Native layer init panicked");
            ready.fail(message.clone());
            Err(PeerKitError::fatal_init(format!("native layer init panicked: {}", message)))
        }
    }
}

// Process-wide default instance. INSTALL serializes installers; DEFAULT is
// only written once startup has completed.
static INSTALL: Mutex<()> = Mutex::new(());
static DEFAULT: RwLock<Option<Arc<Toolkit>>> = RwLock::new(None);

/// Start a toolkit and make it the process default.
///
/// If a live default already exists it is returned and `native` is dropped
/// unused.
pub fn install_default(native: Arc<dyn NativeLayer>, config: ToolkitConfig) -> Result<Arc<Toolkit>> {
    let _install = INSTALL.lock().unwrap_or_else(|p| p.into_inner());

    if let Some(existing) = default_toolkit() {
        if !existing.is_terminated() {
            debug!("Default toolkit already installed");
            return Ok(existing);
        }
    }

    let toolkit = Toolkit::start(native, config)?;
    *DEFAULT.write().unwrap_or_else(|p| p.into_inner()) = Some(toolkit.clone());
    Ok(toolkit)
}

/// The process default toolkit, `None` until one finished starting.
pub fn default_toolkit() -> Option<Arc<Toolkit>> {
    DEFAULT.read().unwrap_or_else(|p| p.into_inner()).clone()
}

/// Terminate and uninstall the process default. Safe when none exists.
pub fn terminate_default() {
    let toolkit = DEFAULT.write().unwrap_or_else(|p| p.into_inner()).take();
    match toolkit {
        Some(toolkit) => toolkit.terminate(),
        None => warn!("terminate_default called without an installed toolkit"),
    }
}
