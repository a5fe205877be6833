//! Window targets for native creation.
//!
//! A [`Window`] is the object a creation request points at. Its native
//! handle slot is the completion condition of the create/destroy
//! rendezvous: written by whichever thread performs the native call, read
//! under the same lock by every waiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::native::NativeHandle;

/// Unique identifier for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    /// Create a new unique WindowId.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

/// Rectangle representing window bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn zero() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// Kind of top-level native window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Decorated top-level window with a title.
    Frame,
    /// Decorated window attached to an owner.
    Dialog,
    /// Undecorated window (popups, menus).
    Plain,
}

/// Everything the native layer needs to create a window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub kind: WindowKind,
    pub title: String,
    pub bounds: Bounds,
    pub resizable: bool,
    /// Native handle of the owner, for dialogs and plain windows.
    pub owner: Option<NativeHandle>,
}

impl WindowSpec {
    pub fn frame(title: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            kind: WindowKind::Frame,
            title: title.into(),
            bounds,
            resizable: true,
            owner: None,
        }
    }

    pub fn dialog(owner: Option<NativeHandle>, title: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            kind: WindowKind::Dialog,
            title: title.into(),
            bounds,
            resizable: false,
            owner,
        }
    }

    pub fn plain(owner: Option<NativeHandle>, bounds: Bounds) -> Self {
        Self {
            kind: WindowKind::Plain,
            title: String::new(),
            bounds,
            resizable: false,
            owner,
        }
    }
}

/// A window that may or may not have been realized natively.
#[derive(Debug)]
pub struct Window {
    id: WindowId,
    spec: WindowSpec,
    native: Mutex<Option<NativeHandle>>,
    realizing: Mutex<()>,
}

impl Window {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            id: WindowId::new(),
            spec,
            native: Mutex::new(None),
            realizing: Mutex::new(()),
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Current native handle, if the window has been created.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        *self.slot()
    }

    pub fn is_realized(&self) -> bool {
        self.native_handle().is_some()
    }

    /// Serializes native creation and destruction of this window.
    ///
    /// Held only around the native call and the slot update, never across
    /// a wait.
    pub(crate) fn realize_guard(&self) -> MutexGuard<'_, ()> {
        self.realizing.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Write the handle slot without waking anyone.
    pub(crate) fn store_native(&self, handle: Option<NativeHandle>) {
        *self.slot() = handle;
    }

    /// Publish the native handle and wake everyone waiting on `signal`.
    pub(crate) fn set_native(&self, handle: Option<NativeHandle>, signal: &Condvar) {
        self.store_native(handle);
        signal.notify_all();
    }

    /// Block until `done` holds for the handle slot.
    ///
    /// Returns `false` if `timeout` elapsed first. The condition is
    /// re-evaluated on every wake, so a notify that lands before the wait
    /// starts, or a spurious wake, is harmless.
    pub(crate) fn wait_until<F>(&self, signal: &Condvar, timeout: Option<Duration>, done: F) -> bool
    where
        F: Fn(&Option<NativeHandle>) -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot();

        while !done(&*slot) {
            match deadline {
                None => {
                    slot = signal.wait(slot).unwrap_or_else(|p| p.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    slot = signal
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0;
                }
            }
        }
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<NativeHandle>> {
        // A poisoned slot still holds a valid Option
        self.native.lock().unwrap_or_else(|p| p.into_inner())
    }
}
