//! Metrics sink collaborator interface
//!
//! The transport and handshake paths record typed counters and durations
//! through this trait; real collectors live outside the core.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

pub trait MetricsSink: Send + Sync {
    fn incr(&self, counter: &'static str) {
        self.incr_by(counter, 1);
    }

    fn incr_by(&self, counter: &'static str, by: u64);

    fn record_duration(&self, name: &'static str, duration: Duration);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn incr_by(&self, _counter: &'static str, _by: u64) {}

    fn record_duration(&self, _name: &'static str, _duration: Duration) {}
}

/// In-memory sink for tests and single-process deployments
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    counters: Mutex<HashMap<&'static str, u64>>,
    durations: Mutex<HashMap<&'static str, Vec<Duration>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn durations(&self, name: &str) -> Vec<Duration> {
        self.durations.lock().get(name).cloned().unwrap_or_default()
    }
}

impl MetricsSink for RecordingMetrics {
    fn incr_by(&self, counter: &'static str, by: u64) {
        *self.counters.lock().entry(counter).or_insert(0) += by;
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        self.durations.lock().entry(name).or_default().push(duration);
    }
}
