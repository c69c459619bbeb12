//! In-process metrics for the gateway.
//!
//! Labelled counters and gauges backed by `DashMap` + atomics, rendered in the
//! Prometheus text exposition format by the `/metrics` handler. Label sets are
//! sorted so a series always maps to the same key.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn render_labels(key: &LabelKey) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|(k, v)| {
            let v = v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
            format!("{k}=\"{v}\"")
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let _ = writeln!(out, "{name}{} {}", render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct RelayMetrics {
    pub ws_sessions: Gauge,
    /// labels: method, status
    pub rpc_calls: CounterVec,
    /// labels: kind, outcome (resolved | timeout | publish_failed)
    pub ipc_commands: CounterVec,
    /// labels: channel
    pub pushes_dropped: CounterVec,
    /// labels: code
    pub inbound_errors: CounterVec,
}

impl RelayMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# TYPE relaywire_ws_sessions_active gauge\nrelaywire_ws_sessions_active {}",
            self.ws_sessions.get()
        );
        self.rpc_calls.render("relaywire_rpc_calls_total", &mut out);
        self.ipc_commands.render("relaywire_ipc_commands_total", &mut out);
        self.pushes_dropped.render("relaywire_pushes_dropped_total", &mut out);
        self.inbound_errors.render("relaywire_inbound_errors_total", &mut out);
        out
    }
}
