//! # PeerKit Headless
//!
//! A simulated native backend. It behaves like a real windowing layer as
//! far as the coordination code can tell: it reports capability bits,
//! runs a never-returning dispatcher loop when asked to, mints handles and
//! checks that window calls arrive on the right thread.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peerkit_core::{CapabilityFlags, Toolkit};
//! use peerkit_headless::HeadlessBuilder;
//!
//! let native = HeadlessBuilder::new()
//!     .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE | CapabilityFlags::NATIVE_DISPATCHER_LOOP)
//!     .build();
//! let toolkit = Toolkit::start(native.clone(), Default::default())?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::Sender;
use peerkit_common::{PeerKitError, Result};
use peerkit_core::{
    CapabilityFlags, Dimension, NativeHandle, NativeLayer, ReadySignal, WindowKind, WindowSpec,
    WmEvent,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

/// First handle value minted. Handles are never zero.
const FIRST_HANDLE: u64 = 0x1000;

enum LoopCommand {
    Serve(Arc<WmEvent>),
    Quit,
}

/// A window as the simulated backend sees it.
#[derive(Debug, Clone)]
pub struct NativeWindow {
    pub kind: WindowKind,
    pub title: String,
    pub creator: ThreadId,
}

/// Counters exposed for assertions and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeadlessStats {
    pub init_calls: u64,
    pub windows_created: u64,
    pub windows_destroyed: u64,
    pub live_windows: u64,
    pub injected_events: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub beeps: u64,
    pub syncs: u64,
    pub terminate_calls: u64,
    pub affinity_violations: u64,
}

#[derive(Default)]
struct Counters {
    init_calls: AtomicU64,
    windows_created: AtomicU64,
    windows_destroyed: AtomicU64,
    injected_events: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    beeps: AtomicU64,
    syncs: AtomicU64,
    terminate_calls: AtomicU64,
    affinity_violations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Builder for [`HeadlessNative`].
#[derive(Debug, Clone)]
pub struct HeadlessBuilder {
    flags: i32,
    screen: Dimension,
    resolution: u32,
    init_failure: Option<String>,
    signal_in_init: bool,
    create_delay: Duration,
    failing_flushes: u64,
}

impl HeadlessBuilder {
    pub fn new() -> Self {
        Self {
            flags: 0,
            screen: Dimension::new(1024, 768),
            resolution: 96,
            init_failure: None,
            signal_in_init: false,
            create_delay: Duration::ZERO,
            failing_flushes: 0,
        }
    }

    /// Capability bits to report.
    pub fn flags(mut self, flags: CapabilityFlags) -> Self {
        self.flags = flags.bits() as i32;
        self
    }

    /// Report a raw capability value, including the failure sentinel.
    pub fn raw_flags(mut self, raw: i32) -> Self {
        self.flags = raw;
        self
    }

    pub fn screen(mut self, width: u32, height: u32) -> Self {
        self.screen = Dimension::new(width, height);
        self
    }

    pub fn resolution(mut self, dpi: u32) -> Self {
        self.resolution = dpi;
        self
    }

    /// Make native init fail with `reason`.
    pub fn fail_init(mut self, reason: impl Into<String>) -> Self {
        self.init_failure = Some(reason.into());
        self
    }

    /// On the synchronous path, signal readiness from inside init rather
    /// than leaving it to the toolkit.
    pub fn signal_in_init(mut self, signal: bool) -> Self {
        self.signal_in_init = signal;
        self
    }

    /// Time every window creation takes.
    pub fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Fail the first `count` flushes.
    pub fn failing_flushes(mut self, count: u64) -> Self {
        self.failing_flushes = count;
        self
    }

    pub fn build(self) -> Arc<HeadlessNative> {
        Arc::new(HeadlessNative {
            config: self.clone(),
            counters: Counters::default(),
            failing_flushes: AtomicU64::new(self.failing_flushes),
            next_handle: AtomicU64::new(FIRST_HANDLE),
            loop_thread: Mutex::new(None),
            loop_tx: Mutex::new(None),
            terminated: AtomicBool::new(false),
            windows: Mutex::new(HashMap::new()),
            clipboards: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for HeadlessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated native layer.
pub struct HeadlessNative {
    config: HeadlessBuilder,
    counters: Counters,
    failing_flushes: AtomicU64,
    next_handle: AtomicU64,
    loop_thread: Mutex<Option<ThreadId>>,
    loop_tx: Mutex<Option<Sender<LoopCommand>>>,
    terminated: AtomicBool,
    windows: Mutex<HashMap<NativeHandle, NativeWindow>>,
    clipboards: Mutex<HashMap<NativeHandle, Option<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl HeadlessNative {
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::from_bits_truncate(self.config.flags.max(0) as u32)
    }

    pub fn stats(&self) -> HeadlessStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        HeadlessStats {
            init_calls: load(&c.init_calls),
            windows_created: load(&c.windows_created),
            windows_destroyed: load(&c.windows_destroyed),
            live_windows: lock(&self.windows).len() as u64,
            injected_events: load(&c.injected_events),
            flushes: load(&c.flushes),
            failed_flushes: load(&c.failed_flushes),
            beeps: load(&c.beeps),
            syncs: load(&c.syncs),
            terminate_calls: load(&c.terminate_calls),
            affinity_violations: load(&c.affinity_violations),
        }
    }

    /// Thread running the native dispatcher loop, if one was entered.
    pub fn loop_thread(&self) -> Option<ThreadId> {
        *lock(&self.loop_thread)
    }

    pub fn window(&self, handle: NativeHandle) -> Option<NativeWindow> {
        lock(&self.windows).get(&handle).cloned()
    }

    /// Creator threads of all live windows.
    pub fn creator_threads(&self) -> Vec<ThreadId> {
        lock(&self.windows).values().map(|w| w.creator).collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    fn mint(&self) -> NativeHandle {
        NativeHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// With an exclusive takeover loop, window calls off the loop thread
    /// would corrupt a real backend.
    fn check_affinity(&self, call: &'static str) -> Result<()> {
        let flags = self.flags();
        if !flags.contains(CapabilityFlags::IS_DISPATCH_EXCLUSIVE)
            || !flags.contains(CapabilityFlags::NATIVE_DISPATCHER_LOOP)
        {
            return Ok(());
        }

        let current = thread::current().id();
        match self.loop_thread() {
            Some(owner) if owner != current => {
                bump(&self.counters.affinity_violations);
                warn!(call, ?current, ?owner, "Native call off the loop thread");
                Err(PeerKitError::native_call(format!(
                    "{} called off the native loop thread",
                    call
                )))
            }
            _ => Ok(()),
        }
    }

    fn run_loop(&self, ready: ReadySignal) {
        let (tx, rx) = crossbeam_channel::unbounded();
        *lock(&self.loop_tx) = Some(tx);
        *lock(&self.loop_thread) = Some(thread::current().id());

        ready.signal();
        debug!("Headless dispatcher loop entered");

        for command in rx {
            match command {
                LoopCommand::Serve(event) => event.serve(self),
                LoopCommand::Quit => break,
            }
        }
        debug!("Headless dispatcher loop left");
    }
}

impl NativeLayer for HeadlessNative {
    fn properties(&self) -> i32 {
        self.config.flags
    }

    fn init(&self, display: Option<&str>, ready: ReadySignal) -> Result<()> {
        bump(&self.counters.init_calls);
        let display_name = display.unwrap_or("<default>");
        info!(display = display_name, "Headless native init");

        if let Some(reason) = &self.config.init_failure {
            return Err(PeerKitError::native_call(reason.clone()));
        }

        if self.flags().contains(CapabilityFlags::NATIVE_DISPATCHER_LOOP) {
            // Never returns until terminate
            self.run_loop(ready);
        } else if self.config.signal_in_init {
            ready.signal();
        }
        Ok(())
    }

    fn terminate(&self) {
        bump(&self.counters.terminate_calls);
        self.terminated.store(true, Ordering::Release);
        if let Some(tx) = lock(&self.loop_tx).take() {
            let _ = tx.send(LoopCommand::Quit);
        }
    }

    fn screen_size(&self) -> Dimension {
        self.config.screen
    }

    fn resolution(&self) -> u32 {
        self.config.resolution
    }

    fn flush(&self) -> Result<()> {
        let failing = self
            .failing_flushes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bump(&self.counters.failed_flushes);
            return Err(PeerKitError::native_call("flush rejected"));
        }
        bump(&self.counters.flushes);
        trace!("Headless flush");
        Ok(())
    }

    fn sync(&self) {
        bump(&self.counters.syncs);
    }

    fn beep(&self) {
        bump(&self.counters.beeps);
    }

    fn send_wm_event(&self, event: Arc<WmEvent>) {
        bump(&self.counters.injected_events);
        match lock(&self.loop_tx).as_ref() {
            Some(tx) => {
                let _ = tx.send(LoopCommand::Serve(event));
            }
            None => warn!(?event, "Injected event with no native loop running"),
        }
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<NativeHandle> {
        self.check_affinity("create_window")?;
        if !self.config.create_delay.is_zero() {
            thread::sleep(self.config.create_delay);
        }

        let handle = self.mint();
        lock(&self.windows).insert(
            handle,
            NativeWindow {
                kind: spec.kind,
                title: spec.title.clone(),
                creator: thread::current().id(),
            },
        );
        bump(&self.counters.windows_created);
        Ok(handle)
    }

    fn destroy_window(&self, handle: NativeHandle) {
        if self.check_affinity("destroy_window").is_err() {
            return;
        }
        if lock(&self.windows).remove(&handle).is_some() {
            bump(&self.counters.windows_destroyed);
        }
    }

    fn clipboard_init(&self) -> Result<NativeHandle> {
        let handle = self.mint();
        lock(&self.clipboards).insert(handle, None);
        Ok(handle)
    }

    fn clipboard_free(&self, clipboard: NativeHandle) {
        lock(&self.clipboards).remove(&clipboard);
    }

    fn clipboard_set_contents(&self, clipboard: NativeHandle, contents: &str) -> Result<()> {
        match lock(&self.clipboards).get_mut(&clipboard) {
            Some(slot) => {
                *slot = Some(contents.to_string());
                Ok(())
            }
            None => Err(PeerKitError::native_call("unknown clipboard")),
        }
    }

    fn clipboard_contents(&self, clipboard: NativeHandle) -> Option<String> {
        lock(&self.clipboards).get(&clipboard).cloned().flatten()
    }
}
