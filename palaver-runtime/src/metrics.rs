//! Metrics instrumentation for runtime observability.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.

use std::time::{Duration, Instant};

/// Record LLM request latency.
pub fn record_llm_latency(duration_ms: f64) {
    metrics::histogram!("llm_request_latency", duration_ms);
}

/// Record tool execution latency.
pub fn record_tool_latency(duration_ms: f64) {
    metrics::histogram!("tool_execution_latency", duration_ms);
}

/// Record how long a whole turn took, lock wait included.
pub fn record_turn_duration(duration_ms: f64) {
    metrics::histogram!("turn_duration", duration_ms);
}

/// Record time spent waiting for a conversation lock.
pub fn record_lock_wait(wait: Duration) {
    metrics::histogram!("lock_wait_duration", wait.as_secs_f64() * 1000.0);
}

/// Increment compaction counter.
pub fn increment_compaction_count() {
    metrics::counter!("compaction_count", 1);
}

/// Increment the counter of turns that hit the iteration cap.
pub fn increment_max_iterations_count() {
    metrics::counter!("max_iterations_count", 1);
}

/// RAII timer for automatic metric recording.
pub struct MetricTimer {
    start: Instant,
    metric_name: &'static str,
}

impl MetricTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        match self.metric_name {
            "llm_request_latency" => record_llm_latency(duration_ms),
            "tool_execution_latency" => record_tool_latency(duration_ms),
            "turn_duration" => record_turn_duration(duration_ms),
            _ => {}
        }
    }
}
