//! Process-wide CDP counters, kept both as plain atomics (for snapshots in
//! logs and tests) and as prometheus collectors (for whoever registers them).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub events: u64,
    pub navigations: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
}

impl AdapterMetricsSnapshot {
    /// Mean latency of successful commands.
    pub fn mean_latency(&self) -> Option<Duration> {
        (self.command_success > 0)
            .then(|| Duration::from_micros(self.command_latency_total_us / self.command_success))
    }

    /// Counters accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            commands: self.commands.saturating_sub(earlier.commands),
            events: self.events.saturating_sub(earlier.events),
            navigations: self.navigations.saturating_sub(earlier.navigations),
            command_success: self.command_success.saturating_sub(earlier.command_success),
            command_failures: self.command_failures.saturating_sub(earlier.command_failures),
            command_latency_total_us: self
                .command_latency_total_us
                .saturating_sub(earlier.command_latency_total_us),
        }
    }
}

struct Tally {
    commands: AtomicU64,
    events: AtomicU64,
    navigations: AtomicU64,
    success: AtomicU64,
    failures: AtomicU64,
    latency_us: AtomicU64,
}

static TALLY: Tally = Tally {
    commands: AtomicU64::new(0),
    events: AtomicU64::new(0),
    navigations: AtomicU64::new(0),
    success: AtomicU64::new(0),
    failures: AtomicU64::new(0),
    latency_us: AtomicU64::new(0),
};

struct Collectors {
    commands: IntCounterVec,
    failures: IntCounterVec,
    latency: HistogramVec,
    events: IntCounter,
    navigations: IntCounter,
}

// Static metric definitions; construction only fails on malformed names.
lazy_static! {
    static ref COLLECTORS: Collectors = Collectors {
        commands: IntCounterVec::new(
            opts!("tra_cdp_commands_total", "CDP commands sent"),
            &["method"]
        )
        .unwrap(),
        failures: IntCounterVec::new(
            opts!("tra_cdp_command_failures_total", "CDP commands that failed"),
            &["method"]
        )
        .unwrap(),
        latency: HistogramVec::new(
            histogram_opts!(
                "tra_cdp_command_duration_seconds",
                "CDP round trip latency",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 15.0]
            ),
            &["method"]
        )
        .unwrap(),
        events: IntCounter::new("tra_cdp_events_total", "CDP events received").unwrap(),
        navigations: IntCounter::new(
            "tra_cdp_navigations_total",
            "Main-frame navigations of the booking tab"
        )
        .unwrap(),
    };
}

/// Expose the adapter collectors through `registry`. Registering twice is harmless.
pub fn register_metrics(registry: &Registry) {
    let c = &*COLLECTORS;
    let results = [
        registry.register(Box::new(c.commands.clone())),
        registry.register(Box::new(c.failures.clone())),
        registry.register(Box::new(c.latency.clone())),
        registry.register(Box::new(c.events.clone())),
        registry.register(Box::new(c.navigations.clone())),
    ];
    for err in results.into_iter().filter_map(Result::err) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn record_command(method: &str) {
    TALLY.commands.fetch_add(1, Ordering::Relaxed);
    COLLECTORS.commands.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    TALLY.success.fetch_add(1, Ordering::Relaxed);
    TALLY.latency_us.fetch_add(micros, Ordering::Relaxed);
    COLLECTORS
        .latency
        .with_label_values(&[method])
        .observe(elapsed.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    TALLY.failures.fetch_add(1, Ordering::Relaxed);
    COLLECTORS.failures.with_label_values(&[method]).inc();
}

pub fn record_event() {
    TALLY.events.fetch_add(1, Ordering::Relaxed);
    COLLECTORS.events.inc();
}

pub fn record_navigation() {
    TALLY.navigations.fetch_add(1, Ordering::Relaxed);
    COLLECTORS.navigations.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
    AdapterMetricsSnapshot {
        commands: read(&TALLY.commands),
        events: read(&TALLY.events),
        navigations: read(&TALLY.navigations),
        command_success: read(&TALLY.success),
        command_failures: read(&TALLY.failures),
        command_latency_total_us: read(&TALLY.latency_us),
    }
}
