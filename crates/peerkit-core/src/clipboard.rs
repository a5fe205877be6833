//! System clipboard peer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use peerkit_common::{PeerKitError, Result};
use tracing::debug;

use crate::native::{NativeHandle, NativeLayer};

/// Native clipboard owned by a toolkit. Disposed at teardown.
pub struct NativeClipboard {
    native: Arc<dyn NativeLayer>,
    handle: NativeHandle,
    disposed: AtomicBool,
}

impl NativeClipboard {
    pub fn new(native: Arc<dyn NativeLayer>) -> Result<Self> {
        let handle = native.clipboard_init()?;
        debug!(?handle, "System clipboard created");
        Ok(Self {
            native,
            handle,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn set_contents(&self, contents: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(PeerKitError::Terminated);
        }
        self.native.clipboard_set_contents(self.handle, contents)
    }

    /// Current text, `None` when empty or disposed.
    pub fn contents(&self) -> Option<String> {
        if self.is_disposed() {
            return None;
        }
        self.native.clipboard_contents(self.handle)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release the native clipboard. Only the first call reaches the
    /// native layer.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.native.clipboard_free(self.handle);
        debug!(handle = ?self.handle, "System clipboard disposed");
    }
}

impl fmt::Debug for NativeClipboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClipboard")
            .field("handle", &self.handle)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
