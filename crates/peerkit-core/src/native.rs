//! The native boundary.
//!
//! Everything PeerKit needs from a windowing backend is expressed by
//! [`NativeLayer`]. Implementations are free to be FFI shims over a real
//! toolkit or in-process simulations; the coordination code never looks
//! past this trait.

use std::fmt;
use std::sync::Arc;

use peerkit_common::Result;

use crate::barrier::ReadySignal;
use crate::event::WmEvent;
use crate::window::WindowSpec;

/// Opaque reference minted by the native layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

/// Screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A native windowing backend.
///
/// All methods may be called from any thread unless the backend reports
/// `IS_DISPATCH_EXCLUSIVE`, in which case [`create_window`] and
/// [`destroy_window`] are only ever called from the owning thread.
///
/// [`create_window`]: NativeLayer::create_window
/// [`destroy_window`]: NativeLayer::destroy_window
pub trait NativeLayer: Send + Sync + 'static {
    /// Raw capability mask, or [`crate::capabilities::FAILED`].
    fn properties(&self) -> i32;

    /// Bring the native layer up.
    ///
    /// Backends reporting `NATIVE_DISPATCHER_LOOP` never return from here
    /// while the process runs. They must call [`ReadySignal::signal`] after
    /// their internal setup and before entering the loop. Synchronous
    /// backends may signal or simply return `Ok`.
    fn init(&self, display: Option<&str>, ready: ReadySignal) -> Result<()>;

    /// Tear the native layer down. Must not block.
    fn terminate(&self);

    fn screen_size(&self) -> Dimension;

    /// Screen resolution in dots per inch.
    fn resolution(&self) -> u32;

    /// Push pending drawing to the screen.
    fn flush(&self) -> Result<()>;

    /// Wait until the native side has processed all pending requests.
    fn sync(&self);

    fn beep(&self);

    /// Inject a request into the native dispatcher loop.
    ///
    /// Only used when the collector thread owns dispatch. The backend must
    /// eventually serve the event on its loop thread via [`WmEvent::serve`].
    fn send_wm_event(&self, event: Arc<WmEvent>);

    fn create_window(&self, spec: &WindowSpec) -> Result<NativeHandle>;

    fn destroy_window(&self, handle: NativeHandle);

    fn clipboard_init(&self) -> Result<NativeHandle>;

    fn clipboard_free(&self, clipboard: NativeHandle);

    /// Take clipboard ownership with the given text.
    fn clipboard_set_contents(&self, clipboard: NativeHandle, contents: &str) -> Result<()>;

    fn clipboard_contents(&self, clipboard: NativeHandle) -> Option<String>;
}
