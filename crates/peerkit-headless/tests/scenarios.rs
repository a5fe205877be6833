//! # Toolkit Scenario Tests
//!
//! End-to-end runs of the toolkit against the headless backend, one per
//! backend personality.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use peerkit_core::{
    Bounds, CapabilityFlags, Event, PeerKitError, StartupPath, Toolkit, ToolkitConfig, Window,
    WindowSpec,
};
use peerkit_headless::{HeadlessBuilder, HeadlessNative};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start(native: &Arc<HeadlessNative>, config: ToolkitConfig) -> Arc<Toolkit> {
    init_logging();
    Toolkit::start(native.clone(), config).unwrap()
}

fn frame(title: &str) -> Arc<Window> {
    Arc::new(Window::new(WindowSpec::frame(title, Bounds::new(0, 0, 400, 300))))
}

fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Plain backend: no hand-off, no synthetic events.
#[test]
fn test_unrestricted_backend_creates_in_place() {
    let native = HeadlessBuilder::new().build();
    let toolkit = start(&native, ToolkitConfig::default());
    assert_eq!(toolkit.startup_path(), StartupPath::Synchronous);

    let window = frame("plain");
    let began = Instant::now();
    assert!(!toolkit.create_window(&window).unwrap());
    assert!(began.elapsed() < Duration::from_secs(1));

    assert!(window.is_realized());
    assert_eq!(toolkit.rendezvous_stats().synthetic_events, 0);
    assert_eq!(native.stats().injected_events, 0);
    assert_eq!(native.creator_threads(), vec![thread::current().id()]);
    toolkit.terminate();
}

/// Exclusive backend with a takeover loop: one native injection per request.
#[test]
fn test_exclusive_takeover_injects_once() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE | CapabilityFlags::NATIVE_DISPATCHER_LOOP)
        .build();
    let toolkit = start(&native, ToolkitConfig::default());

    assert_eq!(toolkit.startup_path(), StartupPath::Takeover);
    assert_ne!(toolkit.ready_thread(), thread::current().id());
    assert_eq!(native.loop_thread(), toolkit.collector_thread());

    let window = frame("takeover");
    assert!(toolkit.create_window(&window).unwrap());
    assert!(window.is_realized());

    let stats = native.stats();
    assert_eq!(stats.injected_events, 1);
    assert_eq!(stats.affinity_violations, 0);
    assert_eq!(native.creator_threads(), vec![native.loop_thread().unwrap()]);

    assert!(toolkit.destroy_window(&window).unwrap());
    assert_eq!(native.stats().live_windows, 0);
    toolkit.terminate();
}

/// Exclusive backend without takeover: requests go through the queue.
#[test]
fn test_exclusive_event_thread_posts_to_queue() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE)
        .create_delay(Duration::from_millis(20))
        .build();
    let toolkit = start(&native, ToolkitConfig::default());

    let window = frame("queued");
    assert!(toolkit.create_window(&window).unwrap());
    assert!(window.is_realized());

    assert_eq!(native.stats().injected_events, 0);
    assert_eq!(toolkit.rendezvous_stats().posted, 1);
    assert_eq!(native.creator_threads(), vec![toolkit.dispatch_thread().unwrap()]);
    toolkit.terminate();
}

#[test]
fn test_concurrent_requests_serialize_on_loop_thread() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE | CapabilityFlags::NATIVE_DISPATCHER_LOOP)
        .build();
    let toolkit = start(&native, ToolkitConfig::default());

    let requesters: Vec<_> = (0..16)
        .map(|i| {
            let toolkit = toolkit.clone();
            thread::spawn(move || {
                let window = frame(&format!("w{}", i));
                toolkit.create_window(&window).unwrap();
                window
            })
        })
        .collect();

    let windows: Vec<_> = requesters.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(windows.iter().all(|w| w.is_realized()));

    let owner = native.loop_thread().unwrap();
    assert_eq!(native.creator_threads().len(), 16);
    assert!(native.creator_threads().iter().all(|t| *t == owner));
    assert_eq!(native.stats().injected_events, 16);
    assert_eq!(native.stats().affinity_violations, 0);
    toolkit.terminate();
}

/// Flush-only backend at 50 ms: about ten flushes in half a second.
#[test]
fn test_flush_rate_and_stop() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::NEEDS_FLUSH)
        .build();
    let interval = Duration::from_millis(50);
    let toolkit = start(&native, ToolkitConfig::default().with_flush_interval(interval));

    toolkit.start_dispatch().unwrap();
    thread::sleep(Duration::from_millis(500));
    let flushes = native.stats().flushes;
    assert!((7..=12).contains(&flushes), "flushed {} times", flushes);

    toolkit.stop_dispatch();
    // At most one tick may still be in flight
    thread::sleep(interval * 2);
    let settled = native.stats().flushes;
    thread::sleep(interval * 4);
    assert_eq!(native.stats().flushes, settled);
    toolkit.terminate();
}

#[test]
fn test_flush_failures_do_not_stop_flushing() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::NEEDS_FLUSH)
        .failing_flushes(3)
        .build();
    let toolkit = start(
        &native,
        ToolkitConfig::default().with_flush_interval(Duration::from_millis(10)),
    );

    toolkit.start_dispatch().unwrap();
    assert!(wait_for(Duration::from_secs(2), || native.stats().flushes >= 3));
    assert_eq!(native.stats().failed_flushes, 3);
    assert!(toolkit.is_flushing());
    toolkit.terminate();
}

#[test]
fn test_init_failure_is_fatal_on_both_paths() {
    init_logging();
    for flags in [CapabilityFlags::empty(), CapabilityFlags::NATIVE_DISPATCHER_LOOP] {
        let native = HeadlessBuilder::new()
            .flags(flags)
            .fail_init("no display")
            .build();
        let err = Toolkit::start(native.clone(), ToolkitConfig::default()).unwrap_err();
        assert!(err.is_fatal(), "{:?} gave {}", flags, err);
        assert_eq!(native.stats().init_calls, 1);
    }
}

#[test]
fn test_failed_capability_report_is_fatal() {
    init_logging();
    let native = HeadlessBuilder::new().raw_flags(peerkit_core::FAILED).build();
    let err = Toolkit::start(native.clone(), ToolkitConfig::default()).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(native.stats().init_calls, 0);
}

#[test]
fn test_in_init_signal_on_sync_path() {
    let native = HeadlessBuilder::new()
        .signal_in_init(true)
        .screen(1920, 1080)
        .resolution(144)
        .build();
    let toolkit = start(&native, ToolkitConfig::default().with_display(":1"));

    assert_eq!(toolkit.ready_thread(), thread::current().id());
    assert_eq!(toolkit.screen_size().width, 1920);
    assert_eq!(toolkit.resolution(), 144);
    assert_eq!(toolkit.config().display.as_deref(), Some(":1"));
    toolkit.terminate();
}

#[test]
fn test_invoke_later_and_listeners() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE)
        .build();
    let toolkit = start(&native, ToolkitConfig::default());

    let (tx, rx) = crossbeam_channel::unbounded();
    toolkit.add_listener(move |event| {
        if let Event::User { payload, .. } = event {
            let _ = tx.send(payload.clone());
        }
    });

    let poster = toolkit.clone();
    toolkit
        .invoke_later(move || {
            poster
                .post_event(Event::User {
                    id: 1,
                    payload: "from-dispatch".into(),
                })
                .unwrap();
        })
        .unwrap();

    let got: String = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(got, "from-dispatch");
    toolkit.terminate();
}

#[test]
fn test_teardown_order_and_idempotence() {
    let native = HeadlessBuilder::new()
        .flags(
            CapabilityFlags::IS_DISPATCH_EXCLUSIVE
                | CapabilityFlags::NATIVE_DISPATCHER_LOOP
                | CapabilityFlags::NEEDS_FLUSH,
        )
        .build();
    let toolkit = start(&native, ToolkitConfig::default());

    let clipboard = toolkit.system_clipboard().unwrap();
    clipboard.set_contents("bye").unwrap();
    toolkit.create_window(&frame("last")).unwrap();
    assert!(toolkit.is_flushing());

    toolkit.terminate();
    toolkit.terminate();

    assert!(!toolkit.is_dispatching());
    assert!(!toolkit.is_flushing());
    assert!(clipboard.is_disposed());
    assert_eq!(native.stats().terminate_calls, 1);
    assert!(native.is_terminated());
    assert!(matches!(
        toolkit.create_window(&frame("late")),
        Err(PeerKitError::Terminated)
    ));
}

#[test]
fn test_bounded_wait_on_stalled_owner() {
    let native = HeadlessBuilder::new()
        .flags(CapabilityFlags::IS_DISPATCH_EXCLUSIVE)
        .create_delay(Duration::from_millis(300))
        .build();
    let toolkit = start(
        &native,
        ToolkitConfig::default().with_create_timeout(Duration::from_millis(50)),
    );

    let window = frame("slow");
    let err = toolkit.create_window(&window).unwrap_err();
    assert!(matches!(err, PeerKitError::Timeout(_)));

    // The owner still finishes the request afterwards
    assert!(wait_for(Duration::from_secs(2), || window.is_realized()));
    toolkit.terminate();
}

#[test]
fn test_stats_serialize() {
    let native = HeadlessBuilder::new().build();
    let json = serde_json::to_value(native.stats()).unwrap();
    assert_eq!(json["windows_created"], 0);
    assert_eq!(json["affinity_violations"], 0);
}
