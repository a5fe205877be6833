//! Native capability bits and the modes derived from them.
//!
//! The raw mask is read once per toolkit start and resolved into two small
//! enums, [`StartupPath`] and [`DispatchOwner`], so that the rest of the
//! crate branches on modes instead of re-testing bits.

use bitflags::bitflags;
use peerkit_common::{PeerKitError, Result};

/// Raw value a native layer reports when it cannot describe itself.
pub const FAILED: i32 = -1;

bitflags! {
    /// What the native backend requires or provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapabilityFlags: u32 {
        /// Native calls may block the calling thread.
        const IS_BLOCKING = 1;
        /// Window-mutating calls must come from the thread owning the native loop.
        const IS_DISPATCH_EXCLUSIVE = 2;
        /// No damage notification; buffers have to be flushed periodically.
        const NEEDS_FLUSH = 4;
        /// Native init never returns, it becomes the dispatcher loop.
        const NATIVE_DISPATCHER_LOOP = 8;
        /// Window decorations are drawn by an external window manager.
        const EXTERNAL_DECORATION = 16;
    }
}

impl CapabilityFlags {
    /// Decode the mask reported by the native layer.
    ///
    /// Unknown bits are kept but never consulted. The [`FAILED`] sentinel
    /// (or any negative value) is fatal.
    pub fn from_native(raw: i32) -> Result<Self> {
        if raw < 0 {
            return Err(PeerKitError::fatal_init(format!(
                "native capability query failed ({})",
                raw
            )));
        }
        Ok(Self::from_bits_retain(raw as u32))
    }

    pub fn startup_path(self) -> StartupPath {
        if self.contains(Self::NATIVE_DISPATCHER_LOOP) {
            StartupPath::Takeover
        } else {
            StartupPath::Synchronous
        }
    }

    pub fn dispatch_owner(self) -> DispatchOwner {
        if !self.contains(Self::IS_DISPATCH_EXCLUSIVE) {
            DispatchOwner::Unrestricted
        } else if self.contains(Self::NATIVE_DISPATCHER_LOOP) {
            DispatchOwner::Collector
        } else {
            DispatchOwner::EventThread
        }
    }

    pub fn needs_flush(self) -> bool {
        self.contains(Self::NEEDS_FLUSH)
    }
}

/// How the native layer is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPath {
    /// Native init returns; secondary init runs on the starting thread.
    Synchronous,
    /// Native init never returns; it runs on the collector thread and
    /// signals readiness from inside the call.
    Takeover,
}

/// Which thread may issue window-mutating native calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOwner {
    /// Any thread.
    Unrestricted,
    /// The collector thread running the native loop. Requests are injected
    /// through the native layer.
    Collector,
    /// The managed event dispatch thread. Requests travel through the
    /// event queue.
    EventThread,
}

impl DispatchOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOwner::Unrestricted => "unrestricted",
            DispatchOwner::Collector => "collector",
            DispatchOwner::EventThread => "event-thread",
        }
    }
}
