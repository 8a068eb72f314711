//! Lifetime counters and their Prometheus-style text exposition

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

use crate::events::OUTCOME_PREFIX;
use crate::types::RunStatus;

/// Event outcomes reported even before the first event
const SEEDED_EVENT_OUTCOMES: &[&str] = &[
    "ok",
    "failed",
    "skipped",
    "unreachable",
    "no_hosts",
    "file_diff",
    "async_failed",
    "async_ok",
    "async_poll",
];

/// Point-in-time copy of the lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub completions: BTreeMap<String, u64>,
    pub events: BTreeMap<String, u64>,
}

/// Monotonic counters since service start
#[derive(Debug)]
pub struct LifetimeCounters {
    inner: Mutex<CounterSnapshot>,
}

impl Default for LifetimeCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeCounters {
    pub fn new() -> Self {
        let snapshot = CounterSnapshot {
            completions: RunStatus::terminal_statuses()
                .iter()
                .map(|status| (status.to_string(), 0))
                .collect(),
            events: SEEDED_EVENT_OUTCOMES
                .iter()
                .map(|outcome| (outcome.to_string(), 0))
                .collect(),
        };
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    fn counts(&self) -> MutexGuard<'_, CounterSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_completion(&self, status: RunStatus) {
        *self.counts().completions.entry(status.to_string()).or_insert(0) += 1;
    }

    /// Count a `runner_on_*` event under its short name; other kinds are ignored
    pub fn record_event(&self, kind: &str) {
        if let Some(outcome) = kind.strip_prefix(OUTCOME_PREFIX) {
            *self.counts().events.entry(outcome.to_string()).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        self.counts().clone()
    }
}

#[derive(Debug)]
struct Metric {
    help: &'static str,
    kind: &'static str,
    samples: Vec<(Vec<(&'static str, String)>, u64)>,
}

impl Metric {
    fn new(help: &'static str, kind: &'static str) -> Self {
        Self {
            help,
            kind,
            samples: Vec::new(),
        }
    }

    fn add(&mut self, labels: Vec<(&'static str, String)>, value: u64) {
        self.samples.push((labels, value));
    }
}

/// Name of this machine as used in metric labels
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Render counters plus the current gauges, metrics sorted by name
pub fn render(
    counters: &CounterSnapshot,
    host: &str,
    active_runs: usize,
    playbook_count: usize,
) -> String {
    let started = Instant::now();
    let mut metrics: BTreeMap<&'static str, Metric> = BTreeMap::new();

    let mut events = Metric::new(
        "event/task states for all playbooks executed since daemon started",
        "count",
    );
    for (outcome, count) in &counters.events {
        events.add(
            vec![("hostname", host.to_string()), ("event_status", outcome.clone())],
            *count,
        );
    }
    metrics.insert("runner_service_event_status", events);

    let mut playbooks = Metric::new("number of playbooks known to the service", "gauge");
    playbooks.add(vec![("hostname", host.to_string())], playbook_count as u64);
    metrics.insert("runner_service_playbook_count", playbooks);

    let mut active = Metric::new("number of playbook jobs running", "gauge");
    active.add(vec![("hostname", host.to_string())], active_runs as u64);
    metrics.insert("runner_service_playbooks_active", active);

    let mut completions = Metric::new("playbook completion states since daemon started", "count");
    for (status, count) in &counters.completions {
        completions.add(
            vec![("hostname", host.to_string()), ("status", status.clone())],
            *count,
        );
    }
    metrics.insert("runner_service_playbooks_status", completions);

    let mut scrape = Metric::new("time taken to gather the data", "gauge");
    scrape.add(
        vec![("hostname", host.to_string())],
        started.elapsed().as_secs(),
    );
    metrics.insert("runner_service_duration_scrape_secs", scrape);

    let mut out = String::new();
    for (name, metric) in &metrics {
        let _ = writeln!(out, "#HELP: {} - {}", name, metric.help);
        let _ = writeln!(out, "#TYPE: {} - {}", name, metric.kind);
        for (labels, value) in &metric.samples {
            let labels: Vec<String> = labels
                .iter()
                .map(|(label, value)| format!("{label}=\"{value}\""))
                .collect();
            let _ = writeln!(out, "{}{{{}}} {}", name, labels.join(","), value);
        }
    }
    debug!("Rendered {} metrics", metrics.len());
    out.trim_end().to_string()
}
