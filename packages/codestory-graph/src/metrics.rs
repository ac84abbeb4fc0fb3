//! In-process metrics for the graph store adapter.
//!
//! Mirrors the Python connector's three instruments — a query counter
//! labeled `(operation, success)`, a duration histogram labeled
//! `(operation)`, and a live-connection gauge — without pulling in a
//! Prometheus client; a production deployment can drain these through
//! whatever exposition format the surrounding service uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct GraphMetrics {
    counters: Mutex<HashMap<(&'static str, bool), u64>>,
    durations: Mutex<HashMap<&'static str, Vec<Duration>>>,
    connections: AtomicI64,
    queries_total: AtomicU64,
}

impl GraphMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, operation: &'static str, success: bool, elapsed: Duration) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        *self
            .counters
            .lock()
            .unwrap()
            .entry((operation, success))
            .or_insert(0) += 1;
        self.durations
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push(elapsed);
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn live_connections(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn queries_total(&self) -> u64 {
        self.queries_total.load(Ordering::Relaxed)
    }

    pub fn success_count(&self, operation: &'static str) -> u64 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(&(operation, true))
            .unwrap_or(&0)
    }

    pub fn failure_count(&self, operation: &'static str) -> u64 {
        *self
            .counters
            .lock()
            .unwrap()
            .get(&(operation, false))
            .unwrap_or(&0)
    }

    pub fn mean_duration(&self, operation: &'static str) -> Option<Duration> {
        let durations = self.durations.lock().unwrap();
        let samples = durations.get(operation)?;
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }
}
