//! In-crate fake native layer for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::Sender;
use peerkit_common::{PeerKitError, Result};

use crate::barrier::ReadySignal;
use crate::capabilities::CapabilityFlags;
use crate::event::WmEvent;
use crate::native::{Dimension, NativeHandle, NativeLayer};
use crate::window::WindowSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitBehavior {
    Normal,
    Fail,
    Panic,
    ReturnWithoutSignal,
    SignalThenFail,
}

enum LoopMsg {
    Wm(Arc<WmEvent>),
    Quit,
}

pub(crate) struct FakeNative {
    flags: i32,
    behavior: Mutex<InitBehavior>,
    init_thread: Mutex<Option<ThreadId>>,
    init_calls: AtomicUsize,
    loop_tx: Mutex<Option<Sender<LoopMsg>>>,
    next_handle: AtomicU64,
    created: Mutex<Vec<(NativeHandle, ThreadId)>>,
    destroyed: Mutex<Vec<NativeHandle>>,
    fail_creates: AtomicBool,
    create_delay: Mutex<Duration>,
    injected: AtomicUsize,
    flushes: AtomicUsize,
    terminated: AtomicUsize,
    clipboards: Mutex<HashMap<NativeHandle, Option<String>>>,
    freed_clipboards: AtomicUsize,
}

impl FakeNative {
    pub(crate) fn new(flags: i32) -> Self {
        init_test_logging();
        Self {
            flags,
            behavior: Mutex::new(InitBehavior::Normal),
            init_thread: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            loop_tx: Mutex::new(None),
            next_handle: AtomicU64::new(0x100),
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            create_delay: Mutex::new(Duration::ZERO),
            injected: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            terminated: AtomicUsize::new(0),
            clipboards: Mutex::new(HashMap::new()),
            freed_clipboards: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_init_behavior(&self, behavior: InitBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub(crate) fn init_thread(&self) -> Option<ThreadId> {
        *self.init_thread.lock().unwrap()
    }

    pub(crate) fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub(crate) fn creator_threads(&self) -> Vec<ThreadId> {
        self.created.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub(crate) fn destroyed(&self) -> Vec<NativeHandle> {
        self.destroyed.lock().unwrap().clone()
    }

    pub(crate) fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub(crate) fn terminate_calls(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn freed_clipboards(&self) -> usize {
        self.freed_clipboards.load(Ordering::SeqCst)
    }

    fn mint(&self) -> NativeHandle {
        NativeHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }
}

impl NativeLayer for FakeNative {
    fn properties(&self) -> i32 {
        self.flags
    }

    fn init(&self, _display: Option<&str>, ready: ReadySignal) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *self.init_thread.lock().unwrap() = Some(thread::current().id());

        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            InitBehavior::Fail => return Err(PeerKitError::native_call("display refused")),
            InitBehavior::Panic => panic!("native init exploded"),
            InitBehavior::ReturnWithoutSignal => return Ok(()),
            InitBehavior::SignalThenFail => {
                ready.signal();
                return Err(PeerKitError::native_call("lost display after ready"));
            }
            InitBehavior::Normal => {}
        }

        let takeover = self.flags >= 0
            && CapabilityFlags::from_bits_truncate(self.flags as u32)
                .contains(CapabilityFlags::NATIVE_DISPATCHER_LOOP);
        if !takeover {
            return Ok(());
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        *self.loop_tx.lock().unwrap() = Some(tx);
        ready.signal();

        for msg in rx {
            match msg {
                LoopMsg::Wm(event) => event.serve(self),
                LoopMsg::Quit => break,
            }
        }
        Ok(())
    }

    fn terminate(&self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.loop_tx.lock().unwrap().take() {
            let _ = tx.send(LoopMsg::Quit);
        }
    }

    fn screen_size(&self) -> Dimension {
        Dimension::new(1280, 800)
    }

    fn resolution(&self) -> u32 {
        96
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sync(&self) {}

    fn beep(&self) {}

    fn send_wm_event(&self, event: Arc<WmEvent>) {
        self.injected.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.loop_tx.lock().unwrap().as_ref() {
            let _ = tx.send(LoopMsg::Wm(event));
        }
    }

    fn create_window(&self, _spec: &WindowSpec) -> Result<NativeHandle> {
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(PeerKitError::native_call("window creation refused"));
        }
        let handle = self.mint();
        self.created
            .lock()
            .unwrap()
            .push((handle, thread::current().id()));
        Ok(handle)
    }

    fn destroy_window(&self, handle: NativeHandle) {
        self.destroyed.lock().unwrap().push(handle);
    }

    fn clipboard_init(&self) -> Result<NativeHandle> {
        let handle = self.mint();
        self.clipboards.lock().unwrap().insert(handle, None);
        Ok(handle)
    }

    fn clipboard_free(&self, clipboard: NativeHandle) {
        if self.clipboards.lock().unwrap().remove(&clipboard).is_some() {
            self.freed_clipboards.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn clipboard_set_contents(&self, clipboard: NativeHandle, contents: &str) -> Result<()> {
        match self.clipboards.lock().unwrap().get_mut(&clipboard) {
            Some(slot) => {
                *slot = Some(contents.to_string());
                Ok(())
            }
            None => Err(PeerKitError::native_call("unknown clipboard")),
        }
    }

    fn clipboard_contents(&self, clipboard: NativeHandle) -> Option<String> {
        self.clipboards
            .lock()
            .unwrap()
            .get(&clipboard)
            .cloned()
            .flatten()
    }
}

/// Route tracing output through the test harness. Safe to call repeatedly.
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `cond` until it holds or `timeout` passes.
pub(crate) fn eventually(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
