//! # PeerKit Core
//!
//! Dispatch and thread coordination between a single-queue event model and
//! a native windowing backend.
//!
//! A backend describes itself once through capability bits. From those the
//! toolkit decides:
//!
//! - how native init runs: on the starting thread, or on a dedicated
//!   collector thread when init turns into a dispatcher loop that never
//!   returns
//! - which thread may create and destroy windows, and how requests from
//!   other threads reach it (native injection or the event queue)
//! - whether a flush thread has to push buffers periodically
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use peerkit_common::ToolkitConfig;
//! use peerkit_core::{Bounds, Toolkit, Window, WindowSpec};
//!
//! let toolkit = Toolkit::start(native, ToolkitConfig::from_env()?)?;
//! let window = Arc::new(Window::new(WindowSpec::frame("main", Bounds::new(0, 0, 640, 480))));
//! toolkit.create_window(&window)?;
//! toolkit.terminate();
//! ```

pub mod barrier;
pub mod capabilities;
pub mod clipboard;
pub mod collector;
pub mod dispatch;
pub mod event;
pub mod flush;
pub mod lifecycle;
pub mod native;
pub mod rendezvous;
pub mod toolkit;
pub mod window;

#[cfg(test)]
mod test_support;

pub use barrier::{ReadySignal, ToolkitState};
pub use capabilities::{CapabilityFlags, DispatchOwner, StartupPath, FAILED};
pub use clipboard::NativeClipboard;
pub use collector::{CollectorThread, COLLECTOR_THREAD_NAME};
pub use dispatch::{EventDispatchThread, DISPATCH_THREAD_NAME};
pub use event::{Event, EventListener, EventQueue, Runnable, WmEvent, WmKind};
pub use flush::{FlushThread, FLUSH_THREAD_NAME};
pub use lifecycle::LifecycleController;
pub use native::{Dimension, NativeHandle, NativeLayer};
pub use rendezvous::{Rendezvous, RendezvousSnapshot, Route};
pub use toolkit::{default_toolkit, install_default, terminate_default, Toolkit};
pub use window::{Bounds, Window, WindowId, WindowKind, WindowSpec};

pub use peerkit_common::{PeerKitError, Result, ToolkitConfig};
