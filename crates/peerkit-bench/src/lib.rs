//! # PeerKit Bench
//!
//! Latency measurements for the window-creation paths: in place on the
//! caller, handed to the dispatch thread through the event queue, and
//! injected into a native dispatcher loop.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use peerkit_bench::Benchmark;
//!
//! let suite = Benchmark::new().run_all()?;
//! suite.print_summary();
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use peerkit_core::{Bounds, CapabilityFlags, Toolkit, ToolkitConfig, Window, WindowSpec};
use peerkit_headless::HeadlessBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Benchmark errors.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Toolkit error: {0}")]
    Toolkit(#[from] peerkit_common::PeerKitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),
}

/// Latency distribution of one measured operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyReport {
    pub name: String,
    pub samples: u64,
    pub mean_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub max_ns: u64,
}

impl LatencyReport {
    pub fn from_samples(name: impl Into<String>, samples: &[Duration]) -> Self {
        let mut sorted: Vec<u64> = samples.iter().map(|d| d.as_nanos() as u64).collect();
        sorted.sort_unstable();

        let count = sorted.len() as u64;
        let mean_ns = if count == 0 {
            0
        } else {
            sorted.iter().sum::<u64>() / count
        };

        Self {
            name: name.into(),
            samples: count,
            mean_ns,
            p50_ns: percentile(&sorted, 50),
            p95_ns: percentile(&sorted, 95),
            max_ns: sorted.last().copied().unwrap_or(0),
        }
    }

    pub fn print_line(&self) {
        println!(
            "{:36} {:>10} {:>10} {:>10} {:>10}",
            self.name,
            format_ns(self.mean_ns),
            format_ns(self.p50_ns),
            format_ns(self.p95_ns),
            format_ns(self.max_ns),
        );
    }
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

fn format_ns(ns: u64) -> String {
    if ns >= 1_000_000 {
        format!("{:.2} ms", ns as f64 / 1_000_000.0)
    } else if ns >= 1_000 {
        format!("{:.2} µs", ns as f64 / 1_000.0)
    } else {
        format!("{} ns", ns)
    }
}

/// Reports from one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSuite {
    pub reports: Vec<LatencyReport>,
    pub total_time: Duration,
}

impl BenchSuite {
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!(
            "{:36} {:>10} {:>10} {:>10} {:>10}",
            "Path", "Mean", "p50", "p95", "Max"
        );
        println!("{}", "-".repeat(80));
        for report in &self.reports {
            report.print_line();
        }
        println!("{}", "-".repeat(80));
        println!("Total time: {:?}", self.total_time);
    }

    pub fn save_json(&self, path: &str) -> Result<(), BenchError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Which creation path a measurement drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePath {
    /// Unrestricted backend, native call on the caller.
    InPlace,
    /// Exclusive backend, request posted to the event queue.
    Queued,
    /// Exclusive takeover backend, request injected into the native loop.
    Injected,
}

impl CreatePath {
    pub const ALL: [CreatePath; 3] = [CreatePath::InPlace, CreatePath::Queued, CreatePath::Injected];

    pub fn name(self) -> &'static str {
        match self {
            CreatePath::InPlace => "create/in-place",
            CreatePath::Queued => "create/queued",
            CreatePath::Injected => "create/injected",
        }
    }

    pub fn flags(self) -> CapabilityFlags {
        match self {
            CreatePath::InPlace => CapabilityFlags::empty(),
            CreatePath::Queued => CapabilityFlags::IS_DISPATCH_EXCLUSIVE,
            CreatePath::Injected => {
                CapabilityFlags::IS_DISPATCH_EXCLUSIVE | CapabilityFlags::NATIVE_DISPATCHER_LOOP
            }
        }
    }

    /// Start a toolkit over a fresh headless backend for this path.
    pub fn toolkit(self) -> Result<Arc<Toolkit>, BenchError> {
        let native = HeadlessBuilder::new().flags(self.flags()).build();
        let toolkit = Toolkit::start(native, ToolkitConfig::default())?;
        toolkit.start_dispatch()?;
        Ok(toolkit)
    }
}

/// A window target for benchmarking.
pub fn bench_window() -> Arc<Window> {
    Arc::new(Window::new(WindowSpec::frame("bench", Bounds::new(0, 0, 640, 480))))
}

/// Create and destroy one window through `toolkit`.
pub fn create_destroy(toolkit: &Toolkit) -> Result<(), BenchError> {
    let window = bench_window();
    toolkit.create_window(&window)?;
    toolkit.destroy_window(&window)?;
    Ok(())
}

/// Post a closure and wait until the dispatch thread ran it.
pub fn invoke_round_trip(toolkit: &Toolkit) -> Result<(), BenchError> {
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    toolkit.invoke_later(move || {
        let _ = tx.send(());
    })?;
    // A dropped sender means the closure never ran; nothing to wait for
    let _ = rx.recv();
    Ok(())
}

/// Simple sampling runner used outside criterion.
pub struct Benchmark {
    pub warmup: u64,
    pub iterations: u64,
}

impl Benchmark {
    pub fn new() -> Self {
        Self {
            warmup: 20,
            iterations: 500,
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Measure `f`, stopping at the first error.
    pub fn measure<F>(&self, name: &str, mut f: F) -> Result<LatencyReport, BenchError>
    where
        F: FnMut() -> Result<(), BenchError>,
    {
        debug!(name, iterations = self.iterations, "Measuring");
        for _ in 0..self.warmup {
            f()?;
        }

        let mut samples = Vec::with_capacity(self.iterations as usize);
        for _ in 0..self.iterations {
            let start = Instant::now();
            f()?;
            samples.push(start.elapsed());
        }
        Ok(LatencyReport::from_samples(name, &samples))
    }

    /// Every creation path plus the invoke-later round trip.
    pub fn run_all(&self) -> Result<BenchSuite, BenchError> {
        let start = Instant::now();
        let mut reports = Vec::new();

        for path in CreatePath::ALL {
            let toolkit = path.toolkit()?;
            reports.push(self.measure(path.name(), || create_destroy(&toolkit))?);
            toolkit.terminate();
        }

        let toolkit = CreatePath::Queued.toolkit()?;
        reports.push(self.measure("invoke/round-trip", || invoke_round_trip(&toolkit))?);
        toolkit.terminate();

        Ok(BenchSuite {
            reports,
            total_time: start.elapsed(),
        })
    }
}

impl Default for Benchmark {
    fn default() -> Self {
        Self::new()
    }
}
