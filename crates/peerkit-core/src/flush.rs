//! Flush thread for backends without native damage notification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use peerkit_common::{Result, ResultExt};
use tracing::{debug, trace};

use crate::native::NativeLayer;

/// Name of the flush thread.
pub const FLUSH_THREAD_NAME: &str = "peerkit-flusher";

/// Periodic ticker forcing native buffer flushes.
///
/// Stop is cooperative: the flag is checked at the top of every tick, so
/// the thread winds down within one interval. Dropping the handle stops it
/// too.
#[derive(Debug)]
pub struct FlushThread {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl FlushThread {
    pub fn start(native: Arc<dyn NativeLayer>, interval: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        let handle = {
            let stop = stop.clone();
            let ticks = ticks.clone();
            thread::Builder::new()
                .name(FLUSH_THREAD_NAME.to_string())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        if let Err(e) = native.flush() {
                            trace!(error = %e, "Flush failed, retrying next tick");
                        }
                        ticks.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(interval);
                    }
                    debug!("Flush thread stopped");
                })
                .context("spawning flush thread")?
        };

        debug!(?interval, "Flush thread started");
        Ok(Self {
            stop,
            ticks,
            interval,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop after the current tick.
    pub fn stop_flushing(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of flush attempts so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop and wait for the thread to exit.
    pub fn join(mut self) {
        self.stop_flushing();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushThread {
    fn drop(&mut self) {
        self.stop_flushing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeNative;
    use std::time::Instant;

    #[test]
    fn test_flush_rate() {
        let native = Arc::new(FakeNative::new(4));
        let flusher = FlushThread::start(native.clone(), Duration::from_millis(50)).unwrap();

        thread::sleep(Duration::from_millis(500));
        let count = native.flushes();
        assert!((7..=12).contains(&count), "flushed {} times", count);
        let ticks = flusher.ticks();
        let flushes = native.flushes() as u64;
        assert!(flushes >= ticks && flushes - ticks <= 1);

        flusher.join();
    }

    #[test]
    fn test_stop_halts_within_one_interval() {
        let native = Arc::new(FakeNative::new(4));
        let interval = Duration::from_millis(50);
        let flusher = FlushThread::start(native.clone(), interval).unwrap();
        thread::sleep(Duration::from_millis(120));

        let stopped_at = Instant::now();
        flusher.stop_flushing();
        assert!(crate::test_support::eventually(Duration::from_secs(1), || {
            flusher.is_finished()
        }));
        assert!(stopped_at.elapsed() < interval * 3);

        let frozen = native.flushes();
        thread::sleep(interval * 3);
        assert_eq!(native.flushes(), frozen);
    }

    #[test]
    fn test_dropping_handle_stops_flushing() {
        let native = Arc::new(FakeNative::new(4));
        let interval = Duration::from_millis(10);
        let flusher = FlushThread::start(native.clone(), interval).unwrap();
        assert!(crate::test_support::eventually(Duration::from_secs(1), || {
            native.flushes() > 0
        }));

        drop(flusher);
        thread::sleep(interval * 3);
        let frozen = native.flushes();
        thread::sleep(interval * 5);
        assert_eq!(native.flushes(), frozen);
    }
}
