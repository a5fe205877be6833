//! PeerKit Smoke Harness
//!
//! Starts the toolkit against the headless backend in each backend
//! personality, hammers window creation from several threads, tears
//! everything down and prints a JSON verdict with timing data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use peerkit_common::{init_logging, LogConfig, LogFormat, ToolkitConfig};
use peerkit_core::{Bounds, CapabilityFlags, DispatchOwner, Toolkit, Window, WindowSpec};
use peerkit_headless::HeadlessBuilder;
use serde_json::json;
use tracing::{error, info};

/// Performance timing collector for tracking operation durations.
struct PerfTiming {
    timings: Mutex<HashMap<&'static str, Vec<Duration>>>,
}

impl PerfTiming {
    fn new() -> Self {
        Self {
            timings: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, operation: &'static str, duration: Duration) {
        self.timings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(operation)
            .or_default()
            .push(duration);
    }

    fn time<T>(&self, operation: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(operation, start.elapsed());
        out
    }

    fn summary(&self) -> serde_json::Value {
        let timings = self.timings.lock().unwrap_or_else(|p| p.into_inner());
        let mut summary = serde_json::Map::new();

        for (op, durations) in timings.iter() {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let millis = durations.iter().map(|d| d.as_secs_f64() * 1000.0);
            let total_ms: f64 = millis.clone().sum();
            let avg_ms = total_ms / count as f64;
            let min_ms = millis.clone().fold(f64::INFINITY, f64::min);
            let max_ms = millis.fold(f64::NEG_INFINITY, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (avg_ms * 100.0).round() / 100.0,
                    "min_ms": (min_ms * 100.0).round() / 100.0,
                    "max_ms": (max_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

/// Backend personality under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    Exclusive,
    Takeover,
    Flush,
}

impl Mode {
    const ALL: [Mode; 4] = [Mode::Plain, Mode::Exclusive, Mode::Takeover, Mode::Flush];

    fn parse(s: &str) -> Option<Vec<Mode>> {
        match s {
            "plain" => Some(vec![Mode::Plain]),
            "exclusive" => Some(vec![Mode::Exclusive]),
            "takeover" => Some(vec![Mode::Takeover]),
            "flush" => Some(vec![Mode::Flush]),
            "all" => Some(Self::ALL.to_vec()),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Mode::Plain => "plain",
            Mode::Exclusive => "exclusive",
            Mode::Takeover => "takeover",
            Mode::Flush => "flush",
        }
    }

    fn flags(self) -> CapabilityFlags {
        match self {
            Mode::Plain => CapabilityFlags::empty(),
            Mode::Exclusive => CapabilityFlags::IS_DISPATCH_EXCLUSIVE,
            Mode::Takeover => {
                CapabilityFlags::IS_DISPATCH_EXCLUSIVE | CapabilityFlags::NATIVE_DISPATCHER_LOOP
            }
            Mode::Flush => CapabilityFlags::NEEDS_FLUSH,
        }
    }
}

/// Parse command line arguments
struct Args {
    modes: Vec<Mode>,
    windows: usize,
    threads: usize,
    duration_ms: u64,
    config: Option<String>,
    perf_output: Option<String>,
    json_logs: bool,
    trace_handoffs: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut modes = Mode::ALL.to_vec();
        let mut windows = 64usize;
        let mut threads = 4usize;
        let mut duration_ms = 500u64;
        let mut config = None;
        let mut perf_output = None;
        let mut json_logs = false;
        let mut trace_handoffs = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mode" => {
                    if let Some(val) = args.next() {
                        modes = Mode::parse(&val).unwrap_or_else(|| Mode::ALL.to_vec());
                    }
                }
                "--windows" => {
                    if let Some(val) = args.next() {
                        windows = val.parse().unwrap_or(64);
                    }
                }
                "--threads" => {
                    if let Some(val) = args.next() {
                        threads = val.parse().unwrap_or(4).max(1);
                    }
                }
                "--duration-ms" => {
                    if let Some(val) = args.next() {
                        duration_ms = val.parse().unwrap_or(500);
                    }
                }
                "--config" => {
                    config = args.next();
                }
                "--perf-output" => {
                    perf_output = args.next();
                }
                "--json-logs" => {
                    json_logs = true;
                }
                "--trace-handoffs" => {
                    trace_handoffs = true;
                }
                _ => {}
            }
        }

        Self {
            modes,
            windows,
            threads,
            duration_ms,
            config,
            perf_output,
            json_logs,
            trace_handoffs,
        }
    }

    fn toolkit_config(&self) -> anyhow::Result<ToolkitConfig> {
        match &self.config {
            Some(path) => ToolkitConfig::load(path)
                .with_context(|| format!("loading toolkit config from {}", path)),
            None => ToolkitConfig::from_env().context("reading toolkit config from environment"),
        }
    }
}

fn run_mode(mode: Mode, args: &Args, config: &ToolkitConfig) -> anyhow::Result<serde_json::Value> {
    let native = HeadlessBuilder::new().flags(mode.flags()).build();
    let perf = Arc::new(PerfTiming::new());

    let toolkit = perf.time("startup", || Toolkit::start(native.clone(), config.clone()))?;
    info!(mode = mode.name(), path = ?toolkit.startup_path(), "Toolkit up");

    let per_thread = args.windows.div_ceil(args.threads);
    let workers: Vec<_> = (0..args.threads)
        .map(|t| {
            let toolkit = toolkit.clone();
            let perf = perf.clone();
            thread::Builder::new()
                .name(format!("smoke-{}", t))
                .spawn(move || -> peerkit_common::Result<Vec<Arc<Window>>> {
                    let mut created = Vec::with_capacity(per_thread);
                    for i in 0..per_thread {
                        let window = Arc::new(Window::new(WindowSpec::frame(
                            format!("smoke {}-{}", t, i),
                            Bounds::new(0, 0, 320, 240),
                        )));
                        perf.time("create_window", || toolkit.create_window(&window))?;
                        created.push(window);
                    }
                    Ok(created)
                })
                .context("spawning smoke worker")
        })
        .collect::<anyhow::Result<_>>()?;

    let mut windows = Vec::new();
    for worker in workers {
        match worker.join() {
            Ok(created) => windows.extend(created?),
            Err(_) => bail!("smoke worker panicked"),
        }
    }

    if mode == Mode::Flush {
        toolkit.start_dispatch()?;
        thread::sleep(Duration::from_millis(args.duration_ms));
    }

    let unrealized = windows.iter().filter(|w| !w.is_realized()).count();
    for window in &windows {
        perf.time("destroy_window", || toolkit.destroy_window(window))?;
    }

    let rendezvous = toolkit.rendezvous_stats();
    perf.time("terminate", || toolkit.terminate());
    let stats = native.stats();

    let mut problems = Vec::new();
    if unrealized > 0 {
        problems.push(format!("{} windows never realized", unrealized));
    }
    if stats.affinity_violations > 0 {
        problems.push(format!("{} affinity violations", stats.affinity_violations));
    }
    if stats.live_windows > 0 {
        problems.push(format!("{} windows leaked", stats.live_windows));
    }
    if toolkit.dispatch_owner() != DispatchOwner::Unrestricted && rendezvous.synthetic_events == 0 {
        problems.push("exclusive backend saw no hand-off".to_string());
    }
    if mode == Mode::Flush && stats.flushes == 0 {
        problems.push("flush thread never flushed".to_string());
    }

    Ok(json!({
        "mode": mode.name(),
        "status": if problems.is_empty() { "pass" } else { "fail" },
        "problems": problems,
        "windows": windows.len(),
        "rendezvous": {
            "synthetic_events": rendezvous.synthetic_events,
            "injected": rendezvous.injected,
            "posted": rendezvous.posted,
        },
        "native": serde_json::to_value(stats)?,
        "perf": perf.summary(),
    }))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = if args.trace_handoffs {
        LogConfig::handoff()
    } else {
        LogConfig::default()
    };
    let log_config = log_config.with_format(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    });
    init_logging(log_config)?;

    info!(
        modes = ?args.modes,
        windows = args.windows,
        threads = args.threads,
        "Starting PeerKit Smoke Harness"
    );

    let config = args.toolkit_config()?;
    let start = Instant::now();

    let mut reports = Vec::new();
    let mut failed = false;
    for &mode in &args.modes {
        match run_mode(mode, &args, &config) {
            Ok(report) => {
                failed |= report["status"] != "pass";
                reports.push(report);
            }
            Err(e) => {
                error!(mode = mode.name(), error = %e, "Smoke run failed");
                failed = true;
                reports.push(json!({
                    "mode": mode.name(),
                    "status": "fail",
                    "problems": [format!("{:#}", e)],
                }));
            }
        }
    }

    if let Some(ref perf_path) = args.perf_output {
        let timings: serde_json::Map<_, _> = reports
            .iter()
            .map(|r| (r["mode"].as_str().unwrap_or("?").to_string(), r["perf"].clone()))
            .collect();
        let perf_json = json!({
            "timings": timings,
            "total_elapsed_ms": start.elapsed().as_millis(),
        });
        if let Err(e) = std::fs::write(perf_path, perf_json.to_string()) {
            error!(?e, "Failed to write perf output");
        } else {
            info!(?perf_path, "Perf summary written");
        }
    }

    let result = json!({
        "status": if failed { "fail" } else { "pass" },
        "elapsed_ms": start.elapsed().as_millis(),
        "modes": reports,
    });
    println!("{}", result);

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
